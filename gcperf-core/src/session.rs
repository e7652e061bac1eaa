//! 分析会话：每个收集器的运行结果、GC 时间累计与重试状态

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorType;
use crate::extractor::GcLogMetrics;
use crate::leaderboard::CollectorSummary;
use crate::schedule::HeapSizes;
use crate::watchdog::RetryState;

/// 一个成功步骤的结果，创建后不再修改
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// 从 1 开始的步骤编号
    pub run_no: u32,
    pub heap: HeapSizes,
    /// GC 时间（秒）
    pub gc_time: f64,
    /// 停顿时间（秒）
    pub stw_time: f64,
    /// 吞吐量（%）
    pub throughput: f64,
    pub full_pauses: u32,
    pub minor_pauses: u32,
}

impl RunOutcome {
    pub fn new(run_no: u32, heap: HeapSizes, metrics: &GcLogMetrics) -> Self {
        Self {
            run_no,
            heap,
            gc_time: metrics.gc_time,
            stw_time: metrics.stw_time,
            throughput: metrics.throughput,
            full_pauses: metrics.full_pauses,
            minor_pauses: metrics.minor_pauses,
        }
    }
}

/// 某收集器扫描的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepStatus {
    /// 尚未运行
    Pending,
    Completed,
    /// 可重试失败过多而放弃
    Suspended,
    /// 不可恢复的进程失败
    Failed,
}

impl fmt::Display for SweepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Suspended => "suspended",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 单个收集器的聚合数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorAggregate {
    pub collector: CollectorType,
    pub outcomes: Vec<RunOutcome>,
    /// GC 时间累计（秒）
    pub total_gc_time: f64,
    pub retry: RetryState,
    pub status: SweepStatus,
}

impl CollectorAggregate {
    pub fn new(collector: CollectorType) -> Self {
        Self {
            collector,
            outcomes: Vec::new(),
            total_gc_time: 0.0,
            retry: RetryState::default(),
            status: SweepStatus::Pending,
        }
    }

    pub fn record(&mut self, outcome: RunOutcome) {
        self.total_gc_time += outcome.gc_time;
        self.outcomes.push(outcome);
    }

    /// 已记录结果上的平均 GC 时间
    pub fn average_gc_time(&self) -> Option<f64> {
        (!self.outcomes.is_empty()).then(|| self.total_gc_time / self.outcomes.len() as f64)
    }

    pub fn best_gc_time(&self) -> Option<f64> {
        self.outcomes.iter().map(|o| o.gc_time).min_by(f64::total_cmp)
    }

    pub fn best_throughput(&self) -> Option<f64> {
        self.outcomes.iter().map(|o| o.throughput).max_by(f64::total_cmp)
    }

    pub fn min_full_pauses(&self) -> Option<u32> {
        self.outcomes.iter().map(|o| o.full_pauses).min()
    }

    pub fn min_minor_pauses(&self) -> Option<u32> {
        self.outcomes.iter().map(|o| o.minor_pauses).min()
    }

    /// 能否进入排行榜
    pub fn is_eligible(&self) -> bool {
        self.status == SweepStatus::Completed && !self.outcomes.is_empty()
    }

    pub fn summary(&self) -> CollectorSummary {
        CollectorSummary {
            best_gc_time: self.best_gc_time(),
            avg_gc_time: self.average_gc_time(),
            best_throughput: self.best_throughput(),
            min_minor_pauses: self.min_minor_pauses(),
            min_full_pauses: self.min_full_pauses(),
        }
    }
}

/// 一次基准测试的全部聚合数据，按请求顺序保存收集器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSession {
    order: Vec<CollectorType>,
    aggregates: BTreeMap<CollectorType, CollectorAggregate>,
}

impl AnalysisSession {
    pub fn new(collectors: &[CollectorType]) -> Self {
        let mut session = Self::default();
        for &collector in collectors {
            if session.aggregates.contains_key(&collector) {
                continue;
            }
            session.order.push(collector);
            session
                .aggregates
                .insert(collector, CollectorAggregate::new(collector));
        }
        session
    }

    pub fn collectors(&self) -> &[CollectorType] {
        &self.order
    }

    pub fn get(&self, collector: CollectorType) -> Option<&CollectorAggregate> {
        self.aggregates.get(&collector)
    }

    pub fn get_mut(&mut self, collector: CollectorType) -> Option<&mut CollectorAggregate> {
        self.aggregates.get_mut(&collector)
    }

    /// 按请求顺序迭代
    pub fn iter(&self) -> impl Iterator<Item = &CollectorAggregate> {
        self.order.iter().filter_map(|c| self.aggregates.get(c))
    }

    /// 其他已有结果的收集器的平均 GC 时间
    pub fn peer_averages(&self, collector: CollectorType) -> Vec<f64> {
        self.iter()
            .filter(|a| a.collector != collector)
            .filter_map(CollectorAggregate::average_gc_time)
            .collect()
    }

    /// 可进入排行榜的收集器的排名数据
    pub fn summaries(&self) -> BTreeMap<CollectorType, CollectorSummary> {
        self.aggregates
            .values()
            .filter(|a| a.is_eligible())
            .map(|a| (a.collector, a.summary()))
            .collect()
    }

    /// 是否所有请求的收集器都产生了可排名的结果
    pub fn all_eligible(&self) -> bool {
        self.aggregates.values().all(CollectorAggregate::is_eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(run_no: u32, gc_time: f64, throughput: f64, full: u32, minor: u32) -> RunOutcome {
        RunOutcome {
            run_no,
            heap: HeapSizes {
                initial_mb: 256,
                max_mb: 512,
            },
            gc_time,
            stw_time: gc_time,
            throughput,
            full_pauses: full,
            minor_pauses: minor,
        }
    }

    #[test]
    fn test_aggregate_statistics() {
        let mut aggregate = CollectorAggregate::new(CollectorType::G1);
        assert_eq!(aggregate.average_gc_time(), None);

        aggregate.record(outcome(1, 0.4, 90.0, 2, 5));
        aggregate.record(outcome(2, 0.2, 95.0, 1, 7));
        assert!((aggregate.total_gc_time - 0.6).abs() < 1e-9);
        assert!((aggregate.average_gc_time().unwrap_or_default() - 0.3).abs() < 1e-9);
        assert_eq!(aggregate.best_gc_time(), Some(0.2));
        assert_eq!(aggregate.best_throughput(), Some(95.0));
        assert_eq!(aggregate.min_full_pauses(), Some(1));
        assert_eq!(aggregate.min_minor_pauses(), Some(5));
        assert!(!aggregate.is_eligible());

        aggregate.status = SweepStatus::Completed;
        assert!(aggregate.is_eligible());
    }

    #[test]
    fn test_session_peers_and_summaries() {
        let mut session = AnalysisSession::new(&[
            CollectorType::Shenandoah,
            CollectorType::Serial,
            CollectorType::Shenandoah,
        ]);
        assert_eq!(
            session.collectors(),
            &[CollectorType::Shenandoah, CollectorType::Serial]
        );
        assert!(session.peer_averages(CollectorType::Shenandoah).is_empty());

        if let Some(serial) = session.get_mut(CollectorType::Serial) {
            serial.record(outcome(1, 0.5, 80.0, 0, 3));
            serial.status = SweepStatus::Completed;
        }
        assert_eq!(session.peer_averages(CollectorType::Shenandoah), vec![0.5]);
        assert!(session.peer_averages(CollectorType::Serial).is_empty());

        let summaries = session.summaries();
        assert_eq!(summaries.len(), 1);
        assert!(summaries.contains_key(&CollectorType::Serial));
        assert!(!session.all_eligible());
    }
}
