//! GC 日志指标提取
//!
//! 对统一日志格式（`[<秒>s][<级别>][<通道>] 消息`）按收集器选择语法：
//!
//! | 收集器 | GC 时间 | STW 时间 |
//! |--------|---------|----------|
//! | Serial / Parallel | `gc,cpu` 行上的 `Real=<秒>s` | 等于 GC 时间 |
//! | G1 | `gc` 标签且带 `GC(n)` 的行上的 `ms` 时长 | 同上且含 `Pause` |
//! | ZGC | `gc,phases` 行上的 `ms` 时长 | 同上且含 `Pause`，排除 `(G)`/`(N)` |
//! | Shenandoah | 同 G1 | 同 G1，排除 `(G)`/`(N)` |
//!
//! 无法解析的数值记录日志后按 0 计入，单行损坏不会使整次运行作废。

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collector::CollectorType;

static GC_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"gc\s").expect("valid regex"));
static GC_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"GC\(\d+\)").expect("valid regex"));
static PAUSE_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?:G|N)\)").expect("valid regex"));
static FULL_GCS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+Full GCs").expect("valid regex"));
static LINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+(?:\.\d+)?)s\](?:\[[^\]]*\]\[([^\]]*)\])?").expect("valid regex")
});

const CPU_CHANNEL: &str = "gc,cpu";
const PHASES_CHANNEL: &str = "gc,phases";
const START_CHANNEL: &str = "gc,start";
const STATS_CHANNEL: &str = "gc,stats";
const PAUSE: &str = "Pause";
const PAUSE_FULL: &str = "Pause Full";
const REAL_TIME: &str = "Real=";
const MILLIS: &str = "ms";

const TRIGGER: &str = "Trigger: ";
const ALLOCATION_FAILURE_TRIGGER: &str = "Trigger: Handle Allocation Failure";
const FREE_TRIGGER: &str = "Trigger: Free";

/// 单个数值标记无法解析
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse duration token `{token}` in line `{line}`")]
pub struct MetricsParseFailure {
    pub token: String,
    pub line: String,
}

/// 一次成功运行的日志指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GcLogMetrics {
    /// GC 时间（秒，3 位小数）
    pub gc_time: f64,
    /// 停顿时间（秒，3 位小数）
    pub stw_time: f64,
    pub full_pauses: u32,
    pub minor_pauses: u32,
    /// 最后一个工作线程退出的时间戳（秒）
    pub last_thread_exit: Option<f64>,
    /// 吞吐量（%）
    pub throughput: f64,
}

impl GcLogMetrics {
    /// 从捕获的标准输出中提取全部指标
    pub fn extract(log: &str, collector: CollectorType) -> Self {
        let lines: Vec<&str> = log.lines().collect();
        let gc_time = gc_time(&lines, collector);
        let stw_time = if collector.is_fully_stop_the_world() {
            gc_time
        } else {
            stw_time(&lines, collector)
        };
        let (full_pauses, minor_pauses) = pause_counts(&lines, collector);
        let last_thread_exit = last_thread_exit(&lines);
        let throughput = calculate_throughput(last_thread_exit.unwrap_or(0.0), stw_time);

        Self {
            gc_time,
            stw_time,
            full_pauses,
            minor_pauses,
            last_thread_exit,
            throughput,
        }
    }
}

/// 计费通道过滤
fn is_cost_line(line: &str, collector: CollectorType) -> bool {
    match collector {
        CollectorType::Serial | CollectorType::Parallel => line.contains(CPU_CHANNEL),
        CollectorType::Zgc => line.contains(PHASES_CHANNEL),
        CollectorType::G1 | CollectorType::Shenandoah => {
            GC_TAG.is_match(line) && GC_NUMBER.is_match(line)
        }
    }
}

/// GC 总时间（秒）
pub fn gc_time<S: AsRef<str>>(lines: &[S], collector: CollectorType) -> f64 {
    let cost_lines = lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| is_cost_line(line, collector));
    if collector.is_fully_stop_the_world() {
        round3(cost_lines.map(real_seconds).sum())
    } else {
        round3(cost_lines.map(millis).sum::<f64>() / 1000.0)
    }
}

/// 停顿时间（秒）
pub fn stw_time<S: AsRef<str>>(lines: &[S], collector: CollectorType) -> f64 {
    if collector.is_fully_stop_the_world() {
        return gc_time(lines, collector);
    }
    let exclude_qualified = matches!(collector, CollectorType::Zgc | CollectorType::Shenandoah);
    let total_ms: f64 = lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| is_cost_line(line, collector) && line.contains(PAUSE))
        .filter(|line| !(exclude_qualified && PAUSE_QUALIFIER.is_match(line)))
        .map(millis)
        .sum();
    round3(total_ms / 1000.0)
}

/// (full 停顿数, minor 停顿数)
pub fn pause_counts<S: AsRef<str>>(lines: &[S], collector: CollectorType) -> (u32, u32) {
    let count = |pred: &dyn Fn(&str) -> bool| -> u32 {
        let n = lines.iter().map(|line| line.as_ref()).filter(|l| pred(l)).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    };

    match collector {
        CollectorType::Serial | CollectorType::Parallel | CollectorType::G1 => {
            // 每次停顿输出开始与结束两行
            let full = count(&|l| l.contains(PAUSE_FULL)) / 2;
            let total = count(&|l| l.contains(PAUSE)) / 2;
            (full, total.saturating_sub(full))
        }
        CollectorType::Zgc => {
            let full = count(&|l| l.contains(PAUSE_FULL)) / 2;
            let total = count(&|l| l.contains(START_CHANNEL));
            (full, total.saturating_sub(full))
        }
        CollectorType::Shenandoah => {
            let full = shenandoah_full_gcs(lines);
            let total = count(&|l| l.contains(PAUSE) && !l.contains(STATS_CHANNEL));
            (full, total.saturating_sub(full))
        }
    }
}

/// 统计摘要中最后一个 `N Full GCs` 的 N
fn shenandoah_full_gcs<S: AsRef<str>>(lines: &[S]) -> u32 {
    lines
        .iter()
        .rev()
        .find_map(|line| {
            FULL_GCS
                .captures(line.as_ref())
                .map(|caps| (line.as_ref(), caps[1].to_string()))
        })
        .map(|(line, value)| {
            value.parse::<u32>().unwrap_or_else(|_| {
                report(MetricsParseFailure {
                    token: value.clone(),
                    line: line.to_string(),
                });
                0
            })
        })
        .unwrap_or(0)
}

/// 最后一个工作线程退出的时间戳
///
/// 取通道含 `exit` 的最后一行；没有时退回到最后一个带时间戳的行。
pub fn last_thread_exit<S: AsRef<str>>(lines: &[S]) -> Option<f64> {
    let mut last_exit = None;
    let mut last_any = None;
    for line in lines.iter().map(|line| line.as_ref()) {
        let Some(caps) = LINE_PREFIX.captures(line) else {
            continue;
        };
        let Ok(timestamp) = caps[1].parse::<f64>() else {
            report(MetricsParseFailure {
                token: caps[1].to_string(),
                line: line.to_string(),
            });
            continue;
        };
        last_any = Some(timestamp);
        if caps.get(2).is_some_and(|channel| channel.as_str().contains("exit")) {
            last_exit = Some(timestamp);
        }
    }
    last_exit.or(last_any)
}

/// 吞吐量 = 100 − STW 时间 ÷ 总运行时间 × 100，不小于 0
pub fn calculate_throughput(total_runtime: f64, stw_time: f64) -> f64 {
    if total_runtime <= 0.0 {
        log::warn!("Total runtime is not positive ({total_runtime}s), throughput set to 0");
        return 0.0;
    }
    (100.0 - stw_time / total_runtime * 100.0).max(0.0)
}

/// 最长的连续 "Handle Allocation Failure" 触发次数
///
/// 只看触发行；`Trigger: Free` 既不计数也不打断，其它触发会清零计数。
pub fn longest_allocation_failure_streak<S: AsRef<str>>(lines: &[S]) -> u32 {
    let mut current = 0u32;
    let mut longest = 0u32;
    for line in lines
        .iter()
        .map(|line| line.as_ref())
        .filter(|line| line.contains(TRIGGER))
    {
        if line.contains(ALLOCATION_FAILURE_TRIGGER) {
            current += 1;
            longest = longest.max(current);
        } else if !line.contains(FREE_TRIGGER) {
            current = 0;
        }
    }
    longest
}

fn real_seconds(line: &str) -> f64 {
    line.split_whitespace()
        .filter_map(|token| token.strip_prefix(REAL_TIME))
        .map(|value| parse_or_zero(value.trim_end_matches('s'), line))
        .sum()
}

fn millis(line: &str) -> f64 {
    line.split_whitespace()
        .filter(|token| token.starts_with(|c: char| c.is_ascii_digit()))
        .filter_map(|token| token.strip_suffix(MILLIS))
        .map(|value| parse_or_zero(value, line))
        .sum()
}

fn parse_or_zero(value: &str, line: &str) -> f64 {
    value.parse::<f64>().unwrap_or_else(|_| {
        report(MetricsParseFailure {
            token: value.to_string(),
            line: line.to_string(),
        });
        0.0
    })
}

fn report(failure: MetricsParseFailure) {
    log::warn!("{failure}; counted as zero");
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
