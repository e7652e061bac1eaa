//! 基准测试结果报告生成器
//!
//! 负责三类输出：
//! - 每次运行一行的 CSV 文件与结果行
//! - 文本、JSON、Markdown 格式的排行榜报告
//! - GC 时间、吞吐量直方图与平均 GC 时间柱状图（SVG）

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use gcperf_core::{
    AnalysisReport, AnalysisSession, CollectorAggregate, CollectorType, Leaderboard,
    RankingMetric, SweepStatus,
};

use crate::config::ReportFormat;

/// CSV 表头
pub const CSV_HEADER: &str = "GCType,RunNo,GCRuntime(sec),Throughput(%),FullPauses,MinorPauses";

/// 直方图最多使用的分箱数
const MAX_HISTOGRAM_BINS: usize = 10;

/// CSV 文件名，形如 `results-2024-03-01-12-30-00.csv`
pub fn csv_file_name(timestamp: DateTime<Local>) -> String {
    format!("results-{}.csv", timestamp.format("%Y-%m-%d-%H-%M-%S"))
}

/// 每个已记录运行一行，按请求顺序排列收集器
pub fn result_lines(session: &AnalysisSession) -> Vec<String> {
    session
        .iter()
        .flat_map(|aggregate| {
            aggregate.outcomes.iter().map(move |outcome| {
                format!(
                    "{},{},{},{},{},{}",
                    aggregate.collector.name(),
                    outcome.run_no,
                    outcome.gc_time,
                    outcome.throughput,
                    outcome.full_pauses,
                    outcome.minor_pauses
                )
            })
        })
        .collect()
}

/// 把结果行写入 `dir` 下以时间戳命名的 CSV 文件
pub fn write_csv(dir: &Path, session: &AnalysisSession, timestamp: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(csv_file_name(timestamp));

    let mut content = String::from(CSV_HEADER);
    content.push('\n');
    for line in result_lines(session) {
        content.push_str(&line);
        content.push('\n');
    }
    fs::write(&path, content)?;

    log::info!("Results exported to {}", path.display());
    Ok(path)
}

/// 排行榜中的一个名次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCollector {
    pub rank: usize,
    pub collector: CollectorType,
    pub score: u32,
    pub metric_scores: BTreeMap<RankingMetric, u32>,
}

/// 某收集器的汇总结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorResult {
    pub collector: CollectorType,
    pub status: SweepStatus,
    pub runs: usize,
    pub best_gc_time: Option<f64>,
    pub avg_gc_time: Option<f64>,
    pub best_throughput: Option<f64>,
    pub min_full_pauses: Option<u32>,
    pub min_minor_pauses: Option<u32>,
}

impl From<&CollectorAggregate> for CollectorResult {
    fn from(aggregate: &CollectorAggregate) -> Self {
        Self {
            collector: aggregate.collector,
            status: aggregate.status,
            runs: aggregate.outcomes.len(),
            best_gc_time: aggregate.best_gc_time(),
            avg_gc_time: aggregate.average_gc_time(),
            best_throughput: aggregate.best_throughput(),
            min_full_pauses: aggregate.min_full_pauses(),
            min_minor_pauses: aggregate.min_minor_pauses(),
        }
    }
}

/// 扫描失败的收集器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub collector: CollectorType,
    pub message: String,
}

/// 可序列化的报告摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub entry_point: String,
    pub leaderboard: Vec<RankedCollector>,
    pub collectors: Vec<CollectorResult>,
    pub failures: Vec<FailureSummary>,
}

impl ReportSummary {
    pub fn new(entry_point: &str, session: &AnalysisSession, leaderboard: &Leaderboard) -> Self {
        let leaderboard = leaderboard
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| RankedCollector {
                rank: idx + 1,
                collector: entry.collector,
                score: entry.score,
                metric_scores: entry.metric_scores.clone(),
            })
            .collect();

        Self {
            entry_point: entry_point.to_string(),
            leaderboard,
            collectors: session.iter().map(CollectorResult::from).collect(),
            failures: Vec::new(),
        }
    }

    pub fn from_report(report: &AnalysisReport) -> Self {
        let mut summary = Self::new(&report.entry_point, &report.session, &report.leaderboard);
        summary.failures = report
            .failures
            .iter()
            .map(|f| FailureSummary {
                collector: f.collector,
                message: f.error.to_string(),
            })
            .collect();
        summary
    }
}

fn fmt_seconds(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

fn fmt_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}%"))
}

fn fmt_count(value: Option<u32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// 排行榜报告生成器
pub struct LeaderboardReporter {
    format: ReportFormat,
}

impl LeaderboardReporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// 生成报告
    pub fn generate_report(&self, summary: &ReportSummary) -> Result<String> {
        match self.format {
            ReportFormat::Text => Ok(self.generate_text_report(summary)),
            ReportFormat::Json => self.generate_json_report(summary),
            ReportFormat::Markdown => Ok(self.generate_markdown_report(summary)),
        }
    }

    /// 保存报告到文件
    pub fn save_report(&self, summary: &ReportSummary, output_path: &Path) -> Result<()> {
        let report = self.generate_report(summary)?;
        fs::write(output_path, report)?;
        Ok(())
    }

    fn generate_text_report(&self, summary: &ReportSummary) -> String {
        let mut report = String::new();

        report.push_str(&format!("GC benchmark leaderboard for {}\n", summary.entry_point));
        report.push_str("==============================\n\n");

        if summary.leaderboard.is_empty() {
            report.push_str("No collector produced rankable results.\n");
        } else {
            for ranked in &summary.leaderboard {
                report.push_str(&format!(
                    "{}: {} (score {})\n",
                    ranked.rank, ranked.collector, ranked.score
                ));
            }
        }

        report.push_str("\nCollectors:\n");
        report.push_str("-----------\n");
        for result in &summary.collectors {
            report.push_str(&format!(
                "{:<11} {:<10} runs={:<3} best={}s avg={}s throughput={} full={} minor={}\n",
                result.collector.name(),
                result.status.to_string(),
                result.runs,
                fmt_seconds(result.best_gc_time),
                fmt_seconds(result.avg_gc_time),
                fmt_percent(result.best_throughput),
                fmt_count(result.min_full_pauses),
                fmt_count(result.min_minor_pauses),
            ));
        }

        if !summary.failures.is_empty() {
            report.push_str("\nFailures:\n");
            for failure in &summary.failures {
                report.push_str(&format!("  {}: {}\n", failure.collector, failure.message));
            }
        }

        report
    }

    fn generate_json_report(&self, summary: &ReportSummary) -> Result<String> {
        Ok(serde_json::to_string_pretty(summary)?)
    }

    fn generate_markdown_report(&self, summary: &ReportSummary) -> String {
        let mut report = String::new();

        report.push_str(&format!("# GC benchmark: `{}`\n\n", summary.entry_point));

        report.push_str("## Leaderboard\n\n");
        if summary.leaderboard.is_empty() {
            report.push_str("No collector produced rankable results.\n\n");
        } else {
            report.push_str("| Rank | Collector | Score |\n");
            report.push_str("|------|-----------|-------|\n");
            for ranked in &summary.leaderboard {
                report.push_str(&format!(
                    "| {} | {} | {} |\n",
                    ranked.rank, ranked.collector, ranked.score
                ));
            }
            report.push('\n');
        }

        report.push_str("## Collectors\n\n");
        report.push_str(
            "| Collector | Status | Runs | Best GC (s) | Avg GC (s) | Throughput | Full | Minor |\n",
        );
        report.push_str(
            "|-----------|--------|------|-------------|------------|------------|------|-------|\n",
        );
        for result in &summary.collectors {
            let status = match result.status {
                SweepStatus::Completed => "✅ completed",
                SweepStatus::Suspended => "🟡 suspended",
                SweepStatus::Failed => "🔴 failed",
                SweepStatus::Pending => "pending",
            };
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
                result.collector,
                status,
                result.runs,
                fmt_seconds(result.best_gc_time),
                fmt_seconds(result.avg_gc_time),
                fmt_percent(result.best_throughput),
                fmt_count(result.min_full_pauses),
                fmt_count(result.min_minor_pauses),
            ));
        }

        if !summary.failures.is_empty() {
            report.push_str("\n## Failures\n\n");
            for failure in &summary.failures {
                report.push_str(&format!("- **{}**: {}\n", failure.collector, failure.message));
            }
        }

        report
    }
}

/// 等宽分箱：返回 `(下界, 上界, 计数)`
///
/// 所有取值相同时只有一个宽度为 1 的分箱。
pub fn histogram_bins(values: &[f64]) -> Vec<(f64, f64, u32)> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![(min - 0.5, min + 0.5, values.len() as u32)];
    }

    let bins = values.len().min(MAX_HISTOGRAM_BINS);
    let width = range / bins as f64;
    let mut counts = vec![0u32; bins];
    for &value in values {
        let idx = (((value - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let lower = min + width * i as f64;
            (lower, lower + width, count)
        })
        .collect()
}

/// 图表生成器
pub struct ChartRenderer {
    charts_dir: PathBuf,
}

impl ChartRenderer {
    pub fn new(charts_dir: impl Into<PathBuf>) -> Self {
        Self {
            charts_dir: charts_dir.into(),
        }
    }

    /// 生成所有图表，返回写入的文件
    pub fn render(&self, session: &AnalysisSession) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.charts_dir)?;
        let mut written = Vec::new();

        for aggregate in session.iter().filter(|a| !a.outcomes.is_empty()) {
            let name = aggregate.collector.name().to_lowercase();

            let runtimes: Vec<f64> = aggregate.outcomes.iter().map(|o| o.gc_time).collect();
            let path = self.charts_dir.join(format!("{name}-runtime.svg"));
            self.draw_histogram(
                &path,
                &format!("{} Runtime (in s)", aggregate.collector.name()),
                &runtimes,
            )?;
            written.push(path);

            let throughputs: Vec<f64> = aggregate.outcomes.iter().map(|o| o.throughput).collect();
            let path = self.charts_dir.join(format!("{name}-throughput.svg"));
            self.draw_histogram(
                &path,
                &format!("{} Throughput (in %)", aggregate.collector.name()),
                &throughputs,
            )?;
            written.push(path);
        }

        let mut averages: Vec<(CollectorType, f64)> = session
            .iter()
            .filter_map(|a| a.average_gc_time().map(|avg| (a.collector, avg)))
            .collect();
        if !averages.is_empty() {
            averages.sort_by(|a, b| a.1.total_cmp(&b.1));
            let path = self.charts_dir.join("average-runtime.svg");
            self.draw_average_runtimes(&path, &averages)?;
            written.push(path);
        }

        log::info!("Wrote {} chart(s) to {}", written.len(), self.charts_dir.display());
        Ok(written)
    }

    /// 绘制单个指标的直方图
    fn draw_histogram(&self, path: &Path, title: &str, values: &[f64]) -> Result<()> {
        use plotters::prelude::*;

        let bins = histogram_bins(values);
        let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
            return Ok(());
        };
        let x_range = first.0..last.1;
        let max_count = bins.iter().map(|&(_, _, c)| c).max().unwrap_or(1) as f64 * 1.2;

        let root = SVGBackend::new(path, (640, 480)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(5)
            .x_label_area_size(30)
            .y_label_area_size(30)
            .build_cartesian_2d(x_range, 0.0..max_count)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(6)
            .y_labels(5)
            .x_label_formatter(&|x| format!("{x:.2}"))
            .y_label_formatter(&|y| format!("{y:.0}"))
            .draw()?;

        // 柱形之间留出分箱宽度的 5% 空隙
        let bar_series = bins.iter().map(|&(lower, upper, count)| {
            let gap = (upper - lower) * 0.05;
            Rectangle::new(
                [(lower + gap, 0.0), (upper - gap, f64::from(count))],
                BLUE.filled(),
            )
        });
        chart.draw_series(bar_series)?;

        root.present()?;
        Ok(())
    }

    /// 按平均 GC 时间升序绘制柱状图
    fn draw_average_runtimes(&self, path: &Path, averages: &[(CollectorType, f64)]) -> Result<()> {
        use plotters::prelude::*;

        let max_avg = averages
            .iter()
            .map(|&(_, avg)| avg)
            .fold(0.0, f64::max);
        let upper = if max_avg > 0.0 { max_avg * 1.2 } else { 1.0 };

        let root = SVGBackend::new(path, (640, 480)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Average Runtimes (in s) by GC Type", ("sans-serif", 20))
            .margin(5)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(0.0..averages.len() as f64, 0.0..upper)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_labels(5)
            .y_label_formatter(&|y| format!("{y:.2}"))
            .x_labels(0)
            .draw()?;

        let bar_width = 0.8;
        let bar_series = averages.iter().enumerate().map(|(i, &(_, avg))| {
            let x = i as f64 + 0.5;
            Rectangle::new(
                [(x - bar_width / 2.0, 0.0), (x + bar_width / 2.0, avg)],
                BLUE.filled(),
            )
        });
        chart.draw_series(bar_series)?;

        // 收集器名称标在柱形上方
        for (i, &(collector, avg)) in averages.iter().enumerate() {
            let x = i as f64 + 0.3;
            chart.draw_series(std::iter::once(Text::new(
                collector.name().to_string(),
                (x, avg + upper * 0.02),
                ("sans-serif", 12).into_font(),
            )))?;
        }

        root.present()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gcperf_core::{GcLogMetrics, HeapSizes, RankingEngine, RunOutcome};

    fn outcome(run_no: u32, gc_time: f64, throughput: f64) -> RunOutcome {
        let metrics = GcLogMetrics {
            gc_time,
            stw_time: 0.01,
            full_pauses: 1,
            minor_pauses: 4,
            last_thread_exit: Some(1.0),
            throughput,
        };
        let heap = HeapSizes {
            initial_mb: 256,
            max_mb: 512,
        };
        RunOutcome::new(run_no, heap, &metrics)
    }

    fn sample_session() -> AnalysisSession {
        let mut session = AnalysisSession::new(&[CollectorType::G1, CollectorType::Serial]);
        if let Some(g1) = session.get_mut(CollectorType::G1) {
            g1.record(outcome(1, 0.5, 95.0));
            g1.record(outcome(2, 0.25, 97.5));
            g1.status = SweepStatus::Completed;
        }
        if let Some(serial) = session.get_mut(CollectorType::Serial) {
            serial.record(outcome(1, 0.75, 90.0));
            serial.status = SweepStatus::Completed;
        }
        session
    }

    fn sample_summary(session: &AnalysisSession) -> ReportSummary {
        let leaderboard =
            RankingEngine::default().rank(&[RankingMetric::BestGcRuntime], &session.summaries());
        ReportSummary::new("App", session, &leaderboard)
    }

    #[test]
    fn test_result_lines_follow_request_order() {
        let lines = result_lines(&sample_session());
        assert_eq!(
            lines,
            vec![
                "G1,1,0.5,95,1,4".to_string(),
                "G1,2,0.25,97.5,1,4".to_string(),
                "SERIAL,1,0.75,90,1,4".to_string(),
            ]
        );
    }

    #[test]
    fn test_csv_export() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let timestamp = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let path = write_csv(temp_dir.path(), &sample_session(), timestamp)?;

        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("results-2024-03-01-12-30-05.csv")
        );
        let content = fs::read_to_string(&path)?;
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(lines.count(), 3);
        Ok(())
    }

    #[test]
    fn test_text_report() -> Result<()> {
        let session = sample_session();
        let summary = sample_summary(&session);
        let report = LeaderboardReporter::new(ReportFormat::Text).generate_report(&summary)?;

        assert!(report.contains("GC benchmark leaderboard for App"));
        assert!(report.contains("1: G1 (score 2)"));
        assert!(report.contains("2: SERIAL (score 1)"));
        assert!(report.contains("best=0.250s"));
        Ok(())
    }

    #[test]
    fn test_json_report() -> Result<()> {
        let session = sample_session();
        let summary = sample_summary(&session);
        let report = LeaderboardReporter::new(ReportFormat::Json).generate_report(&summary)?;

        let parsed: ReportSummary = serde_json::from_str(&report)?;
        assert_eq!(parsed.leaderboard.len(), 2);
        assert_eq!(parsed.leaderboard[0].collector, CollectorType::G1);
        assert_eq!(parsed.collectors[0].runs, 2);
        Ok(())
    }

    #[test]
    fn test_markdown_report() -> Result<()> {
        let session = sample_session();
        let mut summary = sample_summary(&session);
        summary.failures.push(FailureSummary {
            collector: CollectorType::Zgc,
            message: "exit code 1".to_string(),
        });
        let report = LeaderboardReporter::new(ReportFormat::Markdown).generate_report(&summary)?;

        assert!(report.contains("| 1 | G1 | 2 |"));
        assert!(report.contains("✅ completed"));
        assert!(report.contains("- **ZGC**: exit code 1"));
        Ok(())
    }

    #[test]
    fn test_histogram_bins() {
        let bins = histogram_bins(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.2).sum::<u32>(), 4);
        assert_eq!(bins[3].2, 1);

        let flat = histogram_bins(&[2.0, 2.0]);
        assert_eq!(flat, vec![(1.5, 2.5, 2)]);
        assert!(histogram_bins(&[]).is_empty());
    }

    #[test]
    fn test_charts_written() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let written = ChartRenderer::new(temp_dir.path().join("charts")).render(&sample_session())?;

        assert_eq!(written.len(), 5);
        assert!(temp_dir.path().join("charts/g1-runtime.svg").exists());
        assert!(temp_dir.path().join("charts/serial-throughput.svg").exists());
        assert!(temp_dir.path().join("charts/average-runtime.svg").exists());
        Ok(())
    }
}
