//! 扫描、看门狗与运行时配置

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorType;
use crate::error::{AnalysisError, Result};
use crate::leaderboard::RankingMetric;

/// 运行次数上下限
pub const RUNS_RANGE: (u32, u32) = (1, 100);
/// 初始堆大小上下限（MB）
pub const INITIAL_HEAP_RANGE_MB: (u32, u32) = (1, 2048);
/// 初始最大堆大小上下限（MB）
pub const MAX_HEAP_RANGE_MB: (u32, u32) = (16, 8192);
/// 两种增量的上下限（MB）
pub const INCREMENT_RANGE_MB: (u32, u32) = (1, 1024);

/// 堆大小扫描配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// 每个收集器请求的运行次数
    pub runs: u32,
    /// 初始堆大小 -Xms（MB）
    pub initial_heap_mb: u32,
    /// 初始最大堆大小 -Xmx（MB）
    pub initial_max_heap_mb: u32,
    /// 每步 -Xms 增量（MB）
    pub heap_increment_mb: u32,
    /// 每步 -Xmx 增量（MB）
    pub max_heap_increment_mb: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            runs: 5,
            initial_heap_mb: 256,
            initial_max_heap_mb: 512,
            heap_increment_mb: 64,
            max_heap_increment_mb: 128,
        }
    }
}

impl SweepConfig {
    /// 校验所有参数均在允许范围内
    pub fn validate(&self) -> Result<()> {
        check_range("run count", self.runs, RUNS_RANGE)?;
        check_range("initial heap size", self.initial_heap_mb, INITIAL_HEAP_RANGE_MB)?;
        check_range("initial max heap size", self.initial_max_heap_mb, MAX_HEAP_RANGE_MB)?;
        check_range("heap size increment", self.heap_increment_mb, INCREMENT_RANGE_MB)?;
        check_range(
            "max heap size increment",
            self.max_heap_increment_mb,
            INCREMENT_RANGE_MB,
        )?;
        Ok(())
    }
}

fn check_range(what: &str, value: u32, (min, max): (u32, u32)) -> Result<()> {
    if value < min || value > max {
        log::error!("Invalid argument for {what}: {value}");
        return Err(AnalysisError::InvalidConfiguration(format!(
            "{what} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

/// Shenandoah 看门狗配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// 无任何历史时的基础等待时间
    #[serde(with = "millis")]
    pub fallback_deadline: Duration,
    /// 依据其他收集器平均值计算时的最小等待时间
    #[serde(with = "millis")]
    pub min_deadline: Duration,
    /// 其他收集器平均 GC 时间的放大系数 k
    pub peer_factor: f64,
    /// 基于上次成功运行计算时追加的宽限时间
    #[serde(with = "millis")]
    pub success_grace: Duration,
    /// 判定为内存压力停滞所需的连续分配失败触发次数
    pub memory_pressure_streak: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            fallback_deadline: Duration::from_secs(2),
            min_deadline: Duration::from_millis(250),
            peer_factor: 2.0,
            success_grace: Duration::from_millis(250),
            memory_pressure_streak: 3,
        }
    }
}

/// 被测运行时的启动方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 运行时可执行文件
    pub program: PathBuf,
    /// 置于构建出的参数之前的附加参数（例如包装器）
    pub prefix_args: Vec<String>,
    /// 工作目录，内含 `bin/`（被测程序）与 `res/`（捕获文件）
    pub work_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("java"),
            prefix_args: Vec::new(),
            work_dir: PathBuf::from("."),
        }
    }
}

impl RuntimeConfig {
    /// 被测程序所在目录，进程在此目录下启动
    pub fn bin_dir(&self) -> PathBuf {
        self.work_dir.join("bin")
    }

    /// 标准输出捕获目录
    pub fn out_dir(&self) -> PathBuf {
        self.work_dir.join("res").join("out")
    }

    /// 标准错误捕获目录
    pub fn err_dir(&self) -> PathBuf {
        self.work_dir.join("res").join("outErr")
    }
}

/// 引擎完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 扫描参数
    pub sweep: SweepConfig,
    /// 看门狗参数
    pub watchdog: WatchdogConfig,
    /// 运行时参数
    pub runtime: RuntimeConfig,
    /// 请求的收集器，按处理顺序
    pub collectors: Vec<CollectorType>,
    /// 参与排名的指标
    pub metrics: Vec<RankingMetric>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            watchdog: WatchdogConfig::default(),
            runtime: RuntimeConfig::default(),
            collectors: CollectorType::ALL.to_vec(),
            metrics: RankingMetric::ALL.to_vec(),
        }
    }
}

impl EngineConfig {
    /// 校验配置，在启动任何进程之前调用
    pub fn validate(&self) -> Result<()> {
        self.sweep.validate()?;
        if self.collectors.is_empty() {
            return Err(AnalysisError::InvalidConfiguration(
                "at least one collector type must be requested".to_string(),
            ));
        }
        let mut seen = self.collectors.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.collectors.len() {
            return Err(AnalysisError::InvalidConfiguration(
                "collector types must not be repeated".to_string(),
            ));
        }
        if self.watchdog.memory_pressure_streak == 0 || self.watchdog.peer_factor <= 0.0 {
            return Err(AnalysisError::InvalidConfiguration(
                "watchdog streak and peer factor must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// 从文件加载配置（按扩展名选择 TOML 或 JSON）
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(content).map_err(|e| {
                AnalysisError::InvalidConfiguration(format!("JSON parse error: {e}"))
            })
        } else {
            toml::from_str(content).map_err(|e| {
                AnalysisError::InvalidConfiguration(format!("TOML parse error: {e}"))
            })
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
