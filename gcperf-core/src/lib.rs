//! JVM 垃圾收集器基准分析引擎
//!
//! 对每个请求的收集器按递增的堆大小重复运行被测程序，监督每次运行，
//! 从统一 GC 日志中提取指标，并按选中的指标生成排行榜：
//! - 命令构建与堆大小计划
//! - 运行编排与 Shenandoah 看门狗
//! - GC 日志指标提取与运行分类
//! - 排行榜排名

pub mod analysis;
pub mod classifier;
pub mod collector;
pub mod command;
pub mod config;
pub mod error;
pub mod extractor;
pub mod leaderboard;
pub mod orchestrator;
pub mod progress;
pub mod schedule;
pub mod session;
pub mod watchdog;

pub use analysis::{Analysis, AnalysisReport, CollectorFailure};
pub use classifier::{RetryCause, RunVerdict, classify};
pub use collector::CollectorType;
pub use command::{LaunchCommand, LogChannel, RuntimeOption};
pub use config::{EngineConfig, RuntimeConfig, SweepConfig, WatchdogConfig};
pub use error::{AnalysisError, Result};
pub use extractor::{GcLogMetrics, MetricsParseFailure, calculate_throughput};
pub use leaderboard::{
    CollectorSummary, LatencyTable, Leaderboard, LeaderboardEntry, RankingEngine, RankingMetric,
};
pub use orchestrator::{MAX_EXTRA_RUNS, RunOrchestrator};
pub use progress::{ProgressEvent, ProgressSender};
pub use schedule::{HeapSchedule, HeapSizes, MAX_INITIAL_HEAP_MB, MAX_MAX_HEAP_MB};
pub use session::{AnalysisSession, CollectorAggregate, RunOutcome, SweepStatus};
pub use watchdog::{CompletionSignal, RetryState, RunSignal, WatchdogVerdict};
