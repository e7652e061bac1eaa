//! 进度事件流

use std::fmt;

use tokio::sync::mpsc;

use crate::classifier::RetryCause;
use crate::collector::CollectorType;
use crate::schedule::HeapSizes;
use crate::session::SweepStatus;

/// 进度事件发送端
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// 人类可读的进度事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    SweepStarted {
        collector: CollectorType,
        runs: u32,
    },
    StepStarted {
        collector: CollectorType,
        run_no: u32,
        heap: HeapSizes,
    },
    StepCompleted {
        collector: CollectorType,
        run_no: u32,
        gc_time: f64,
    },
    StepVoided {
        collector: CollectorType,
        run_no: u32,
        cause: RetryCause,
    },
    SweepFinished {
        collector: CollectorType,
        status: SweepStatus,
    },
    /// 全部收集器处理完毕
    Done,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SweepStarted { collector, runs } => {
                write!(f, "Analyzing {collector} ({runs} runs requested)")
            }
            Self::StepStarted {
                collector,
                run_no,
                heap,
            } => write!(
                f,
                "{collector} run no. {run_no}: xms {}M, xmx {}M",
                heap.initial_mb, heap.max_mb
            ),
            Self::StepCompleted {
                collector,
                run_no,
                gc_time,
            } => write!(f, "{collector} run no. {run_no} finished, GC time {gc_time:.3}s"),
            Self::StepVoided {
                collector,
                run_no,
                cause,
            } => write!(f, "{collector} run no. {run_no} voided ({cause}), retrying"),
            Self::SweepFinished { collector, status } => {
                write!(f, "Analysis of {collector} finished: {status}")
            }
            Self::Done => f.write_str("Analysis done"),
        }
    }
}

/// 发送事件；接收端已关闭时忽略
pub(crate) fn emit(sender: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}
