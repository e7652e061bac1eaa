//! 基准测试驱动：准备被测程序、运行分析、持久化排名并导出结果

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::{Local, Utc};

use gcperf_core::{Analysis, AnalysisReport, ProgressSender};

use crate::binary::prepare_subject;
use crate::config::GcPerfConfig;
use crate::reporter::{ChartRenderer, ReportSummary, result_lines, write_csv};
use crate::storage::RankingStore;

/// 一次基准测试的全部产物
#[derive(Debug)]
pub struct DriverOutput {
    pub report: AnalysisReport,
    /// 每次运行一行：`GCType,RunNo,GCRuntime,Throughput,FullPauses,MinorPauses`
    pub result_lines: Vec<String>,
    pub ranking_id: i64,
    pub csv_path: Option<PathBuf>,
    pub charts: Vec<PathBuf>,
}

impl DriverOutput {
    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_report(&self.report)
    }
}

/// 基准测试驱动
pub struct GcPerfDriver<S: RankingStore> {
    config: GcPerfConfig,
    store: S,
}

impl<S: RankingStore> GcPerfDriver<S> {
    pub fn new(config: GcPerfConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &GcPerfConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 对给定的 `.class` 或 `.jar` 文件执行完整的基准测试
    ///
    /// 排行榜在分析结束后恰好存储一次；CSV 与图表按配置生成。
    pub async fn launch(&self, file: &Path, progress: Option<ProgressSender>) -> Result<DriverOutput> {
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid subject file: {}", file.display()))?;

        let runtime = &self.config.engine.runtime;
        let jar = jar_tool(&runtime.program);
        let entry_point = prepare_subject(file, &runtime.bin_dir(), &jar).await?;

        let mut analysis = Analysis::new(self.config.engine.clone(), entry_point);
        if let Some(sender) = progress {
            analysis = analysis.with_progress(sender);
        }
        let report = analysis.perform().await?;

        for (idx, collector) in report.leaderboard.ranking().iter().enumerate() {
            log::info!("{}: {}", idx + 1, collector);
        }

        let ranking_id =
            self.store
                .insert_ranking(Utc::now(), file_name, &report.leaderboard.ranking())?;

        let lines = result_lines(&report.session);

        let charts = if self.config.plot {
            ChartRenderer::new(self.config.charts_dir()).render(&report.session)?
        } else {
            Vec::new()
        };

        let csv_path = if self.config.export_csv {
            Some(write_csv(&self.config.csv_dir(), &report.session, Local::now())?)
        } else {
            None
        };

        Ok(DriverOutput {
            report,
            result_lines: lines,
            ranking_id,
            csv_path,
            charts,
        })
    }
}

/// 与运行时位于同一目录的 `jar` 工具
pub fn jar_tool(runtime_program: &Path) -> PathBuf {
    match runtime_program.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join("jar"),
        _ => PathBuf::from("jar"),
    }
}
