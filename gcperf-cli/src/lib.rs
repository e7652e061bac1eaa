//! GC 基准测试命令行工具
//!
//! 在分析引擎之上提供：
//! - 被测程序准备（`.class` / `.jar`）
//! - 排名历史存储
//! - CSV、报告与图表输出
//! - 一次完整基准测试的驱动

pub mod binary;
pub mod config;
pub mod driver;
pub mod reporter;
pub mod storage;

pub use binary::{parse_main_class, prepare_subject};
pub use config::{GcPerfConfig, ReportFormat};
pub use driver::{DriverOutput, GcPerfDriver, jar_tool};
pub use reporter::{
    ChartRenderer, LeaderboardReporter, ReportSummary, csv_file_name, result_lines, write_csv,
};
pub use storage::{RankingRecord, RankingStore, SqliteRankingStore};
