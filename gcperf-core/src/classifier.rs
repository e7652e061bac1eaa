//! 运行结果分类

use std::fmt;

use serde::{Deserialize, Serialize};

/// 错误输出中的内存不足标记
pub const OUT_OF_MEMORY_MARKER: &str = "OutOfMemoryError";

/// 可重试失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryCause {
    /// 进程因内存不足退出
    OutOfMemory,
    /// 看门狗强制终止了进程
    Suspended,
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::Suspended => f.write_str("suspended by watchdog"),
        }
    }
}

/// 单次运行的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    Success,
    /// 作废本步骤并把允许的迭代次数加一
    Retryable(RetryCause),
    /// 终止该收集器的扫描
    Fatal { exit_code: Option<i32> },
}

impl RunVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// 按挂起标志、退出码与错误输出分类
///
/// 没有退出码（被信号终止）按非零处理。
pub fn classify(suspended: bool, exit_code: Option<i32>, stderr: &str) -> RunVerdict {
    if suspended {
        return RunVerdict::Retryable(RetryCause::Suspended);
    }
    match exit_code {
        Some(0) => RunVerdict::Success,
        _ if stderr.contains(OUT_OF_MEMORY_MARKER) => RunVerdict::Retryable(RetryCause::OutOfMemory),
        code => RunVerdict::Fatal { exit_code: code },
    }
}
