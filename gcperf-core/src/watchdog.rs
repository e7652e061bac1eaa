//! Shenandoah 看门狗
//!
//! 该收集器的进程不能在有限时间内可靠地报告完成，看门狗为每次运行设置自适应截止时间，
//! 超时后强制终止进程并根据捕获的日志判断原因。
//!
//! 每一步都新建一组单次信号：
//!
//! - `started`：运行任务 → 看门狗，进程已启动（携带 pid）
//! - `kill`：看门狗 → 运行任务，请求终止
//! - `exited`：运行任务 → 看门狗，进程如何结束
//! - [`CompletionSignal`]：运行任务或看门狗 → 编排器，每步恰好生效一次

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::WatchdogConfig;
use crate::extractor::longest_allocation_failure_streak;

/// 看门狗对一次运行的判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchdogVerdict {
    /// 进程在截止时间前自然退出
    CompletedInTime,
    /// 连续的分配失败触发，堆太小；不回退计划
    MemoryPressureStall,
    /// 偶发停滞；回退计划一步并放大下次的截止时间
    PrematureInterrupt,
}

/// 每个收集器的重试状态，由会话持有并显式传入编排器与看门狗
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryState {
    /// 过早中断次数，每次使堆大小计划回退一步
    pub premature_interrupts: u32,
    /// 连续的内存压力终止次数
    pub memory_pressure_kills: u32,
    /// 上一次终止是否判断为内存压力
    pub last_kill_memory_pressure: bool,
    /// 截止时间放大系数
    pub magnifier: u32,
    /// 上一次成功运行的 GC 时间（秒）
    pub last_successful_gc_time: Option<f64>,
    /// 已记录的可重试失败次数
    pub retryable_failures: u32,
}

impl RetryState {
    /// 计算截止时间时使用的放大系数；上次为内存压力终止时不放大
    pub fn effective_magnifier(&self) -> u32 {
        if self.last_kill_memory_pressure {
            0
        } else {
            self.magnifier
        }
    }

    pub fn apply(&mut self, verdict: WatchdogVerdict) {
        match verdict {
            WatchdogVerdict::CompletedInTime => {
                self.last_kill_memory_pressure = false;
                self.memory_pressure_kills = 0;
                self.magnifier = 1;
            }
            WatchdogVerdict::MemoryPressureStall => {
                self.last_kill_memory_pressure = true;
                self.memory_pressure_kills += 1;
            }
            WatchdogVerdict::PrematureInterrupt => {
                self.last_kill_memory_pressure = false;
                self.memory_pressure_kills = 0;
                self.premature_interrupts += 1;
                self.magnifier += 1;
            }
        }
    }

    pub fn record_retryable_failure(&mut self) {
        self.retryable_failures += 1;
    }

    pub fn record_success(&mut self, gc_time: f64) {
        self.last_successful_gc_time = Some(gc_time);
    }
}

/// 自适应截止时间
///
/// 优先使用上次成功运行的 GC 时间，其次是其他收集器的平均 GC 时间，最后是固定的基础值；
/// 三者都乘以 (放大系数 + 1)。
pub fn deadline(config: &WatchdogConfig, retry: &RetryState, peer_averages: &[f64]) -> Duration {
    let factor = f64::from(retry.effective_magnifier()) + 1.0;
    if let Some(last) = retry.last_successful_gc_time {
        let base = Duration::try_from_secs_f64(last).unwrap_or(Duration::ZERO);
        return scale(base + config.success_grace, factor, config);
    }
    if !peer_averages.is_empty() {
        let mean = peer_averages.iter().sum::<f64>() / peer_averages.len() as f64;
        let scaled = Duration::try_from_secs_f64(config.peer_factor * mean * factor)
            .unwrap_or(config.min_deadline);
        return scaled.max(config.min_deadline);
    }
    scale(config.fallback_deadline, factor, config)
}

fn scale(base: Duration, factor: f64, config: &WatchdogConfig) -> Duration {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(config.fallback_deadline)
}

/// 编排器观察到的完成信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSignal {
    /// 进程是否被看门狗终止
    pub suspended: bool,
    pub exit_code: Option<i32>,
}

/// 幂等的完成信号：只有第一次 `complete` 生效
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    sender: Arc<Mutex<Option<oneshot::Sender<RunSignal>>>>,
}

impl CompletionSignal {
    pub fn channel() -> (Self, oneshot::Receiver<RunSignal>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// 发出完成信号，返回本次调用是否生效
    pub fn complete(&self, signal: RunSignal) -> bool {
        match self.sender.lock().take() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }
}

/// 进程结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Natural(Option<i32>),
    Killed,
}

/// 看门狗一侧的信号端
pub(crate) struct WatchdogChannels {
    pub started: oneshot::Receiver<Option<u32>>,
    pub kill: oneshot::Sender<()>,
    pub exited: oneshot::Receiver<ProcessExit>,
}

/// 监督一次运行
///
/// 进程未能启动时返回 `None`。
pub(crate) async fn supervise(
    channels: WatchdogChannels,
    deadline: Duration,
    stdout_path: PathBuf,
    memory_pressure_streak: u32,
    completion: CompletionSignal,
) -> Option<WatchdogVerdict> {
    let WatchdogChannels {
        started,
        kill,
        mut exited,
    } = channels;

    let pid = started.await.ok()?;
    log::debug!("Watchdog armed for process {pid:?} with deadline {deadline:?}");

    tokio::select! {
        exit = &mut exited => {
            return exit.ok().map(|_| WatchdogVerdict::CompletedInTime);
        }
        () = tokio::time::sleep(deadline) => {}
    }

    if kill.send(()).is_err() {
        // 运行任务已经越过等待点，进程是自然退出的
        return exited.await.ok().map(|_| WatchdogVerdict::CompletedInTime);
    }

    match exited.await.ok()? {
        ProcessExit::Natural(_) => return Some(WatchdogVerdict::CompletedInTime),
        ProcessExit::Killed => {}
    }

    let verdict = judge(&stdout_path, memory_pressure_streak).await;
    log::warn!("Process {pid:?} exceeded its deadline of {deadline:?} and was terminated: {verdict:?}");
    completion.complete(RunSignal {
        suspended: true,
        exit_code: None,
    });
    Some(verdict)
}

async fn judge(stdout_path: &Path, memory_pressure_streak: u32) -> WatchdogVerdict {
    let streak = match tokio::fs::read(stdout_path).await {
        Ok(bytes) => {
            let log = String::from_utf8_lossy(&bytes);
            let lines: Vec<&str> = log.lines().collect();
            longest_allocation_failure_streak(&lines)
        }
        Err(e) => {
            log::warn!("Failed to read {}: {e}", stdout_path.display());
            0
        }
    };
    if streak >= memory_pressure_streak {
        WatchdogVerdict::MemoryPressureStall
    } else {
        WatchdogVerdict::PrematureInterrupt
    }
}
