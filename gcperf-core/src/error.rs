//! 分析引擎错误类型

use thiserror::Error;

use crate::collector::CollectorType;

/// 分析引擎错误
///
/// 可重试的运行失败（内存不足、看门狗挂起）和日志解析失败不会以错误形式传播，
/// 分别由 [`crate::classifier::RunVerdict::Retryable`] 与
/// [`crate::extractor::MetricsParseFailure`] 在本地吸收。
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 扫描参数越界，未启动任何进程
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// 进程以非零退出码结束且无可识别的可恢复原因
    #[error(
        "unexpected failure of the {collector} workload process (exit code {exit_code:?}); \
         verify the entry point or check the error output for details"
    )]
    UnexpectedProcessFailure {
        collector: CollectorType,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// 可重试失败次数超过上限，放弃该收集器的扫描
    #[error(
        "sweep suspended for {collector} after {retryable_failures} retryable failures; \
         the heap size or the heap increments are probably too small"
    )]
    SweepSuspended {
        collector: CollectorType,
        retryable_failures: u32,
    },

    /// 无法启动运行时进程
    #[error("failed to launch runtime process: {0}")]
    Launch(#[source] std::io::Error),

    /// 捕获文件读写失败
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 监督任务异常结束或完成信号丢失
    #[error("run coordination failed: {0}")]
    Coordination(String),
}

impl AnalysisError {
    /// 是否应当立即中止整个基准测试（而不仅是当前收集器）
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_))
    }
}

/// 分析引擎结果类型
pub type Result<T> = std::result::Result<T, AnalysisError>;
