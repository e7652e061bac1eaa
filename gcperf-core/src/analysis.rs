//! 分析驱动：依次扫描请求的收集器并生成排行榜

use chrono::{DateTime, Utc};

use crate::collector::CollectorType;
use crate::config::EngineConfig;
use crate::error::{AnalysisError, Result};
use crate::leaderboard::{LatencyTable, Leaderboard, RankingEngine};
use crate::orchestrator::RunOrchestrator;
use crate::progress::{ProgressEvent, ProgressSender, emit};
use crate::session::{AnalysisSession, SweepStatus};

/// 某收集器扫描失败的原因
#[derive(Debug)]
pub struct CollectorFailure {
    pub collector: CollectorType,
    pub error: AnalysisError,
}

/// 一次基准测试的结果
#[derive(Debug)]
pub struct AnalysisReport {
    pub entry_point: String,
    pub session: AnalysisSession,
    pub leaderboard: Leaderboard,
    pub failures: Vec<CollectorFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    done: bool,
}

impl AnalysisReport {
    /// 所有收集器都已处理完毕
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 所有请求的收集器都产生了可排名的结果
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty() && self.session.all_eligible()
    }

    pub fn status(&self, collector: CollectorType) -> Option<SweepStatus> {
        self.session.get(collector).map(|a| a.status)
    }
}

/// 基准测试分析
#[derive(Debug)]
pub struct Analysis {
    config: EngineConfig,
    entry_point: String,
    ranking: RankingEngine,
    progress: Option<ProgressSender>,
}

impl Analysis {
    pub fn new(config: EngineConfig, entry_point: impl Into<String>) -> Self {
        Self {
            config,
            entry_point: entry_point.into(),
            ranking: RankingEngine::default(),
            progress: None,
        }
    }

    /// 把进度事件推送到给定通道
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_latency_table(mut self, table: LatencyTable) -> Self {
        self.ranking = RankingEngine::new(table);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// 执行完整的基准测试
    ///
    /// 配置错误在启动任何进程之前返回；单个收集器的失败被记录在报告中，
    /// 其余收集器照常运行。
    pub async fn perform(&self) -> Result<AnalysisReport> {
        self.config.validate()?;
        if self.entry_point.trim().is_empty() {
            return Err(AnalysisError::InvalidConfiguration(
                "entry point must not be empty".to_string(),
            ));
        }

        let started_at = Utc::now();
        let mut session = AnalysisSession::new(&self.config.collectors);
        let mut failures = Vec::new();
        let orchestrator = RunOrchestrator::new(&self.config, &self.entry_point)
            .with_progress(self.progress.as_ref());

        for collector in session.collectors().to_vec() {
            let peers = session.peer_averages(collector);
            let Some(aggregate) = session.get_mut(collector) else {
                continue;
            };

            let status = match orchestrator.run_sweep(aggregate, &peers).await {
                Ok(()) => SweepStatus::Completed,
                Err(e) if e.is_configuration_error() => return Err(e),
                Err(e) => {
                    let status = match e {
                        AnalysisError::SweepSuspended { .. } => SweepStatus::Suspended,
                        _ => SweepStatus::Failed,
                    };
                    log::error!("Analysis of {collector} {status}: {e}");
                    failures.push(CollectorFailure {
                        collector,
                        error: e,
                    });
                    status
                }
            };
            aggregate.status = status;
            emit(
                self.progress.as_ref(),
                ProgressEvent::SweepFinished { collector, status },
            );
        }

        let leaderboard = self.ranking.rank(&self.config.metrics, &session.summaries());
        log::info!("Leaderboard: {:?}", leaderboard.ranking());
        emit(self.progress.as_ref(), ProgressEvent::Done);

        Ok(AnalysisReport {
            entry_point: self.entry_point.clone(),
            session,
            leaderboard,
            failures,
            started_at,
            finished_at: Utc::now(),
            done: true,
        })
    }
}
