//! 运行编排
//!
//! 一个收集器的扫描按步骤顺序执行：计算堆大小、构建命令、启动进程并把标准输出与
//! 标准错误写入本步骤专用的文件，等待完成信号后分类。成功的步骤提取指标并记录结果；
//! 可重试的失败使允许的迭代次数加一；不可恢复的失败终止扫描。

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::oneshot;

use crate::classifier::{RunVerdict, classify};
use crate::collector::CollectorType;
use crate::command::LaunchCommand;
use crate::config::EngineConfig;
use crate::error::{AnalysisError, Result};
use crate::extractor::GcLogMetrics;
use crate::progress::{ProgressEvent, ProgressSender, emit};
use crate::schedule::{HeapSchedule, HeapSizes, MAX_INITIAL_HEAP_MB, MAX_MAX_HEAP_MB};
use crate::session::{CollectorAggregate, RunOutcome};
use crate::watchdog::{
    self, CompletionSignal, ProcessExit, RetryState, RunSignal, WatchdogChannels, WatchdogVerdict,
};

/// 超过请求次数后允许的最大可重试失败次数
pub const MAX_EXTRA_RUNS: u32 = 20;

/// 错误信息中保留的标准错误行数
const STDERR_TAIL_LINES: usize = 20;

/// 一个步骤解决后的全部信息
#[derive(Debug)]
struct StepReport {
    signal: RunSignal,
    watchdog: Option<WatchdogVerdict>,
    stdout: String,
    stderr: String,
}

/// 运行编排器
pub struct RunOrchestrator<'a> {
    config: &'a EngineConfig,
    entry_point: &'a str,
    progress: Option<&'a ProgressSender>,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(config: &'a EngineConfig, entry_point: &'a str) -> Self {
        Self {
            config,
            entry_point,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<&'a ProgressSender>) -> Self {
        self.progress = progress;
        self
    }

    /// 执行一个收集器的完整扫描，结果写入 `aggregate`
    pub async fn run_sweep(
        &self,
        aggregate: &mut CollectorAggregate,
        peer_averages: &[f64],
    ) -> Result<()> {
        let collector = aggregate.collector;
        let sweep = &self.config.sweep;
        let schedule = HeapSchedule::from(sweep);

        log::info!("Starting analysis of {collector} with {} runs", sweep.runs);
        emit(
            self.progress,
            ProgressEvent::SweepStarted {
                collector,
                runs: sweep.runs,
            },
        );

        let mut permitted = sweep.runs;
        let mut step = 0u32;
        while step < permitted {
            if aggregate.retry.retryable_failures > MAX_EXTRA_RUNS {
                log::error!(
                    "Sweep of {collector} suspended after {} retryable failures; \
                     possible problems include too small heap size or too small heap size increments",
                    aggregate.retry.retryable_failures
                );
                return Err(AnalysisError::SweepSuspended {
                    collector,
                    retryable_failures: aggregate.retry.retryable_failures,
                });
            }

            let heap = schedule.size(step, aggregate.retry.premature_interrupts);
            let run_no = step + 1;
            if let Some(warning) = ceiling_warning(heap) {
                log::warn!("{warning} ({collector} run no. {run_no})");
            }
            log::info!(
                "Initializing {collector} run no.: {run_no}; xms: {}(M); xmx: {}(M)",
                heap.initial_mb,
                heap.max_mb
            );
            emit(
                self.progress,
                ProgressEvent::StepStarted {
                    collector,
                    run_no,
                    heap,
                },
            );

            let report = self
                .execute_step(collector, run_no, heap, &aggregate.retry, peer_averages)
                .await?;
            if let Some(verdict) = report.watchdog {
                aggregate.retry.apply(verdict);
            }

            match classify(
                report.signal.suspended,
                report.signal.exit_code,
                &report.stderr,
            ) {
                RunVerdict::Success => {
                    let metrics = GcLogMetrics::extract(&report.stdout, collector);
                    aggregate.retry.record_success(metrics.gc_time);
                    aggregate.record(RunOutcome::new(run_no, heap, &metrics));
                    log::info!(
                        "{collector} run no. {run_no} finished: GC time {:.3}s, STW time {:.3}s, \
                         throughput {:.2}%",
                        metrics.gc_time,
                        metrics.stw_time,
                        metrics.throughput
                    );
                    emit(
                        self.progress,
                        ProgressEvent::StepCompleted {
                            collector,
                            run_no,
                            gc_time: metrics.gc_time,
                        },
                    );
                }
                RunVerdict::Retryable(cause) => {
                    permitted += 1;
                    aggregate.retry.record_retryable_failure();
                    log::warn!("{collector} run no. {run_no} voided ({cause}), extending the sweep");
                    emit(
                        self.progress,
                        ProgressEvent::StepVoided {
                            collector,
                            run_no,
                            cause,
                        },
                    );
                }
                RunVerdict::Fatal { exit_code } => {
                    log::error!(
                        "Unexpected failure of {collector} run no. {run_no} (exit code {exit_code:?})"
                    );
                    return Err(AnalysisError::UnexpectedProcessFailure {
                        collector,
                        exit_code,
                        stderr_tail: tail(&report.stderr, STDERR_TAIL_LINES),
                    });
                }
            }

            step += 1;
            if heap.at_ceiling() {
                break;
            }
        }

        log::info!(
            "Analysis of {collector} finished with {} recorded runs",
            aggregate.outcomes.len()
        );
        Ok(())
    }

    /// 执行一个步骤并等待其完成信号
    async fn execute_step(
        &self,
        collector: CollectorType,
        run_no: u32,
        heap: HeapSizes,
        retry: &RetryState,
        peer_averages: &[f64],
    ) -> Result<StepReport> {
        let command =
            LaunchCommand::build(collector, heap.initial_mb, heap.max_mb, self.entry_point)?;
        let runtime = &self.config.runtime;
        let (stdout_path, stderr_path) =
            capture_paths(runtime.out_dir(), runtime.err_dir(), collector, run_no);
        tokio::fs::create_dir_all(runtime.out_dir()).await?;
        tokio::fs::create_dir_all(runtime.err_dir()).await?;

        let mut process = Command::new(&runtime.program);
        process
            .args(&runtime.prefix_args)
            .args(command.args())
            .current_dir(runtime.bin_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::fs::File::create(&stdout_path)?))
            .stderr(Stdio::from(std::fs::File::create(&stderr_path)?))
            .kill_on_drop(true);

        let (completion, completion_rx) = CompletionSignal::channel();
        let (started_tx, started_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();

        let watchdog = if collector.needs_watchdog() {
            let deadline = watchdog::deadline(&self.config.watchdog, retry, peer_averages);
            log::debug!("{collector} run no. {run_no}: watchdog deadline {deadline:?}");
            Some(tokio::spawn(watchdog::supervise(
                WatchdogChannels {
                    started: started_rx,
                    kill: kill_tx,
                    exited: exited_rx,
                },
                deadline,
                stdout_path.clone(),
                self.config.watchdog.memory_pressure_streak,
                completion.clone(),
            )))
        } else {
            drop((started_rx, kill_tx, exited_rx));
            None
        };

        let runner = tokio::spawn(run_process(process, started_tx, kill_rx, exited_tx, completion));

        let signal = completion_rx.await;
        let runner_result = runner
            .await
            .map_err(|e| AnalysisError::Coordination(format!("runner task failed: {e}")))?;
        let verdict = match watchdog {
            Some(handle) => handle
                .await
                .map_err(|e| AnalysisError::Coordination(format!("watchdog task failed: {e}")))?,
            None => None,
        };
        runner_result?;
        let signal = signal.map_err(|_| {
            AnalysisError::Coordination(format!(
                "{collector} run no. {run_no} completed without a completion signal"
            ))
        })?;

        Ok(StepReport {
            signal,
            watchdog: verdict,
            stdout: read_capture(&stdout_path).await?,
            stderr: read_capture(&stderr_path).await?,
        })
    }
}

/// 运行任务：启动进程，等待其退出或终止请求
async fn run_process(
    mut command: Command,
    started: oneshot::Sender<Option<u32>>,
    kill: oneshot::Receiver<()>,
    exited: oneshot::Sender<ProcessExit>,
    completion: CompletionSignal,
) -> Result<()> {
    let mut child = command.spawn().map_err(AnalysisError::Launch)?;
    let _ = started.send(child.id());

    let exit = tokio::select! {
        status = child.wait() => ProcessExit::Natural(status?.code()),
        Ok(()) = kill => {
            child.kill().await?;
            ProcessExit::Killed
        }
    };

    if let ProcessExit::Natural(exit_code) = exit {
        completion.complete(RunSignal {
            suspended: false,
            exit_code,
        });
    }
    let _ = exited.send(exit);
    Ok(())
}

/// 堆大小到达上限时的警告
fn ceiling_warning(heap: HeapSizes) -> Option<&'static str> {
    match (
        heap.initial_mb == MAX_INITIAL_HEAP_MB,
        heap.max_mb == MAX_MAX_HEAP_MB,
    ) {
        (true, true) => Some(
            "Maximum initial heap size (Xms) and maximum heap size (Xmx) reached, \
             this is the last run",
        ),
        (true, false) => Some("Maximum initial heap size (Xms) reached"),
        (false, true) => Some("Maximum heap size (Xmx) reached"),
        (false, false) => None,
    }
}

/// 本步骤的标准输出与标准错误文件
pub fn capture_paths(
    out_dir: PathBuf,
    err_dir: PathBuf,
    collector: CollectorType,
    run_no: u32,
) -> (PathBuf, PathBuf) {
    let stem = format!("{}-run{run_no}", collector.name().to_ascii_lowercase());
    (
        out_dir.join(format!("{stem}.out")),
        err_dir.join(format!("{stem}.err")),
    )
}

async fn read_capture(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
