//! 排行榜排名引擎
//!
//! 每个选中的指标独立地对全部收集器排序并计分，得分按收集器累加后降序排列。
//! 平局按 [`CollectorType`] 的枚举顺序裁决（排序是稳定的，输入按枚举顺序迭代）。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorType;
use crate::error::AnalysisError;

/// 排名指标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RankingMetric {
    /// 最短单次 GC 时间
    #[serde(rename = "BestGCRuntime")]
    BestGcRuntime,
    /// 平均 GC 时间
    #[serde(rename = "AvgGCRuntime")]
    AvgGcRuntime,
    /// 最高吞吐量
    Throughput,
    /// 固定的延迟定性排序
    Latency,
    /// 最少 minor 停顿
    MinorPauses,
    /// 最少 full 停顿
    FullPauses,
}

impl RankingMetric {
    pub const ALL: [RankingMetric; 6] = [
        RankingMetric::BestGcRuntime,
        RankingMetric::AvgGcRuntime,
        RankingMetric::Throughput,
        RankingMetric::Latency,
        RankingMetric::MinorPauses,
        RankingMetric::FullPauses,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BestGcRuntime => "BestGCRuntime",
            Self::AvgGcRuntime => "AvgGCRuntime",
            Self::Throughput => "Throughput",
            Self::Latency => "Latency",
            Self::MinorPauses => "MinorPauses",
            Self::FullPauses => "FullPauses",
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RankingMetric {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "bestgcruntime" | "best" => Ok(Self::BestGcRuntime),
            "avggcruntime" | "avg" | "average" => Ok(Self::AvgGcRuntime),
            "throughput" => Ok(Self::Throughput),
            "latency" => Ok(Self::Latency),
            "minorpauses" | "minor" => Ok(Self::MinorPauses),
            "fullpauses" | "full" => Ok(Self::FullPauses),
            _ => Err(AnalysisError::InvalidConfiguration(format!(
                "unknown ranking metric: {}",
                s.trim()
            ))),
        }
    }
}

/// 延迟指标使用的定性排序表，从最好到最差
///
/// 该顺序不是测量得出的，而是沿用既有的判断；只有被请求的收集器参与排名。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyTable(Vec<CollectorType>);

impl LatencyTable {
    pub fn new(order: Vec<CollectorType>) -> Self {
        Self(order)
    }

    pub fn order(&self) -> &[CollectorType] {
        &self.0
    }

    /// 过滤到请求的收集器后的顺序
    fn filtered<'a>(
        &'a self,
        requested: &'a BTreeMap<CollectorType, CollectorSummary>,
    ) -> impl Iterator<Item = CollectorType> + 'a {
        self.0.iter().copied().filter(|c| requested.contains_key(c))
    }
}

impl Default for LatencyTable {
    fn default() -> Self {
        Self(vec![
            CollectorType::Zgc,
            CollectorType::Shenandoah,
            CollectorType::Parallel,
            CollectorType::G1,
            CollectorType::Serial,
        ])
    }
}

/// 排名所需的某收集器聚合数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorSummary {
    pub best_gc_time: Option<f64>,
    pub avg_gc_time: Option<f64>,
    pub best_throughput: Option<f64>,
    pub min_minor_pauses: Option<u32>,
    pub min_full_pauses: Option<u32>,
}

/// 排行榜条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub collector: CollectorType,
    pub score: u32,
    /// 每个指标贡献的分数
    pub metric_scores: BTreeMap<RankingMetric, u32>,
}

/// 按总分降序排列的排行榜
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 收集器排名顺序
    pub fn ranking(&self) -> Vec<CollectorType> {
        self.entries.iter().map(|e| e.collector).collect()
    }

    /// 从 1 开始的名次
    pub fn rank_of(&self, collector: CollectorType) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.collector == collector)
            .map(|idx| idx + 1)
    }

    pub fn winner(&self) -> Option<CollectorType> {
        self.entries.first().map(|e| e.collector)
    }
}

/// 排名引擎
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    latency: LatencyTable,
}

impl RankingEngine {
    pub fn new(latency: LatencyTable) -> Self {
        Self { latency }
    }

    /// 对输入中的全部收集器按选中的指标计分并排序
    pub fn rank(
        &self,
        metrics: &[RankingMetric],
        summaries: &BTreeMap<CollectorType, CollectorSummary>,
    ) -> Leaderboard {
        let mut entries: Vec<LeaderboardEntry> = summaries
            .keys()
            .map(|&collector| LeaderboardEntry {
                collector,
                score: 0,
                metric_scores: BTreeMap::new(),
            })
            .collect();

        let mut seen = Vec::with_capacity(metrics.len());
        for &metric in metrics {
            if seen.contains(&metric) {
                continue;
            }
            seen.push(metric);

            for (collector, points) in self.score_metric(metric, summaries) {
                if let Some(entry) = entries.iter_mut().find(|e| e.collector == collector) {
                    entry.score += points;
                    entry.metric_scores.insert(metric, points);
                }
            }
        }

        entries.sort_by(|a, b| b.score.cmp(&a.score));
        log::debug!(
            "Leaderboard: {:?}",
            entries.iter().map(|e| (e.collector, e.score)).collect::<Vec<_>>()
        );
        Leaderboard { entries }
    }

    fn score_metric(
        &self,
        metric: RankingMetric,
        summaries: &BTreeMap<CollectorType, CollectorSummary>,
    ) -> Vec<(CollectorType, u32)> {
        let n = u32::try_from(summaries.len()).unwrap_or(u32::MAX);
        match metric {
            RankingMetric::BestGcRuntime => {
                ascending(summaries, |s| s.best_gc_time.unwrap_or(f64::INFINITY))
                    .into_iter()
                    .zip(0u32..)
                    .map(|(c, idx)| (c, n - idx))
                    .collect()
            }
            RankingMetric::AvgGcRuntime => {
                ascending(summaries, |s| s.avg_gc_time.unwrap_or(f64::INFINITY))
                    .into_iter()
                    .zip(0u32..)
                    .map(|(c, idx)| (c, n - idx))
                    .collect()
            }
            // 吞吐量越高越好：升序排列后名次越靠后得分越高
            RankingMetric::Throughput => ascending(summaries, |s| s.best_throughput.unwrap_or(0.0))
                .into_iter()
                .zip(0u32..)
                .map(|(c, idx)| (c, idx + 1))
                .collect(),
            RankingMetric::Latency => self
                .latency
                .filtered(summaries)
                .zip(0u32..)
                .map(|(c, pos)| (c, n - pos))
                .collect(),
            RankingMetric::MinorPauses => {
                ascending(summaries, |s| f64::from(s.min_minor_pauses.unwrap_or(u32::MAX)))
                    .into_iter()
                    .zip(0u32..)
                    .map(|(c, idx)| (c, n - idx))
                    .collect()
            }
            RankingMetric::FullPauses => {
                ascending(summaries, |s| f64::from(s.min_full_pauses.unwrap_or(u32::MAX)))
                    .into_iter()
                    .zip(0u32..)
                    .map(|(c, idx)| (c, n - idx))
                    .collect()
            }
        }
    }
}

fn ascending<F>(summaries: &BTreeMap<CollectorType, CollectorSummary>, key: F) -> Vec<CollectorType>
where
    F: Fn(&CollectorSummary) -> f64,
{
    let mut keyed: Vec<(CollectorType, f64)> =
        summaries.iter().map(|(&c, s)| (c, key(s))).collect();
    keyed.sort_by(|a, b| a.1.total_cmp(&b.1));
    keyed.into_iter().map(|(c, _)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(best: f64, avg: f64, throughput: f64, minor: u32, full: u32) -> CollectorSummary {
        CollectorSummary {
            best_gc_time: Some(best),
            avg_gc_time: Some(avg),
            best_throughput: Some(throughput),
            min_minor_pauses: Some(minor),
            min_full_pauses: Some(full),
        }
    }

    fn sample() -> BTreeMap<CollectorType, CollectorSummary> {
        BTreeMap::from([
            (CollectorType::Serial, summary(0.10, 0.20, 0.85, 4, 1)),
            (CollectorType::Parallel, summary(0.20, 0.10, 0.90, 5, 2)),
            (CollectorType::G1, summary(0.30, 0.30, 0.95, 3, 0)),
        ])
    }

    #[test]
    fn test_best_gc_runtime() {
        let board = RankingEngine::default().rank(&[RankingMetric::BestGcRuntime], &sample());
        assert_eq!(
            board.ranking(),
            vec![CollectorType::Serial, CollectorType::Parallel, CollectorType::G1]
        );
        assert_eq!(board.entries[0].score, 3);
        assert_eq!(board.entries[2].score, 1);
    }

    #[test]
    fn test_throughput_rewards_highest() {
        let board = RankingEngine::default().rank(&[RankingMetric::Throughput], &sample());
        assert_eq!(board.winner(), Some(CollectorType::G1));
        assert_eq!(board.entries[0].score, 3);
        assert_eq!(board.rank_of(CollectorType::Serial), Some(3));
    }

    #[test]
    fn test_latency_table_filters_requested() {
        let board = RankingEngine::default().rank(&[RankingMetric::Latency], &sample());
        assert_eq!(
            board.ranking(),
            vec![CollectorType::Parallel, CollectorType::G1, CollectorType::Serial]
        );
        assert_eq!(board.entries[0].score, 3);
    }

    #[test]
    fn test_all_metrics_combined() {
        let board = RankingEngine::default().rank(&RankingMetric::ALL, &sample());
        // Serial: 3+2+1+1+2+2 = 11, Parallel: 2+3+2+3+1+1 = 12, G1: 1+1+3+2+3+3 = 13
        assert_eq!(
            board.ranking(),
            vec![CollectorType::G1, CollectorType::Parallel, CollectorType::Serial]
        );
        assert_eq!(board.entries[0].score, 13);
        assert_eq!(board.entries[0].metric_scores.len(), 6);
    }

    #[test]
    fn test_ties_follow_enum_order() {
        let board = RankingEngine::default().rank(&[], &sample());
        assert!(board.entries.iter().all(|e| e.score == 0));
        assert_eq!(
            board.ranking(),
            vec![CollectorType::Serial, CollectorType::Parallel, CollectorType::G1]
        );
    }

    #[test]
    fn test_missing_data_ranks_last() {
        let mut summaries = sample();
        summaries.insert(CollectorType::Zgc, CollectorSummary::default());
        let board = RankingEngine::default().rank(&[RankingMetric::BestGcRuntime], &summaries);
        assert_eq!(board.rank_of(CollectorType::Zgc), Some(4));
    }

    #[test]
    fn test_parse_metric_names() {
        assert_eq!(
            "BestGCRuntime".parse::<RankingMetric>().ok(),
            Some(RankingMetric::BestGcRuntime)
        );
        assert_eq!(
            "minor-pauses".parse::<RankingMetric>().ok(),
            Some(RankingMetric::MinorPauses)
        );
        assert!("fastest".parse::<RankingMetric>().is_err());
    }
}
