//! 命令行工具配置

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use gcperf_core::EngineConfig;

/// 工具配置：引擎配置加上存储与输出选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcPerfConfig {
    /// 引擎配置（扫描、看门狗、运行时、收集器与指标）
    #[serde(flatten)]
    pub engine: EngineConfig,
    /// 排名数据库路径，相对路径基于工作目录
    pub database_path: PathBuf,
    /// 输出目录，CSV 写入 `csv/`，图表写入 `charts/`
    pub output_dir: PathBuf,
    /// 是否导出 CSV
    pub export_csv: bool,
    /// 是否生成图表
    pub plot: bool,
    /// 报告格式
    pub format: ReportFormat,
}

/// 报告格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// 文本格式
    #[default]
    Text,
    /// JSON格式
    Json,
    /// Markdown格式
    Markdown,
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Markdown => "markdown",
        };
        f.write_str(s)
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(anyhow::anyhow!("Unknown report format: {other}")),
        }
    }
}

impl Default for GcPerfConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            database_path: PathBuf::from("res/gcperf.db"),
            output_dir: PathBuf::from("res"),
            export_csv: false,
            plot: false,
            format: ReportFormat::Text,
        }
    }
}

impl GcPerfConfig {
    /// 从文件加载配置，`.json` 按 JSON 解析，其余按 TOML 解析
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.engine.runtime.work_dir.join(path)
        }
    }

    pub fn database_file(&self) -> PathBuf {
        self.resolve(&self.database_path)
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir).join("csv")
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir).join("charts")
    }
}
