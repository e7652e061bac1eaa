//! 被测垃圾收集器类型

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// 被测的运行时垃圾收集器
///
/// 变体顺序即固定的枚举顺序，用于排行榜的确定性平局裁决。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectorType {
    /// 串行收集器
    Serial,
    /// 并行（吞吐量）收集器
    Parallel,
    /// G1 收集器
    G1,
    /// ZGC
    Zgc,
    /// Shenandoah
    Shenandoah,
}

impl CollectorType {
    /// 全部收集器，按枚举顺序
    pub const ALL: [CollectorType; 5] = [
        CollectorType::Serial,
        CollectorType::Parallel,
        CollectorType::G1,
        CollectorType::Zgc,
        CollectorType::Shenandoah,
    ];

    /// 选择该收集器的运行时参数
    pub fn selection_flag(self) -> &'static str {
        match self {
            Self::Serial => "-XX:+UseSerialGC",
            Self::Parallel => "-XX:+UseParallelGC",
            Self::G1 => "-XX:+UseG1GC",
            Self::Zgc => "-XX:+UseZGC",
            Self::Shenandoah => "-XX:+UseShenandoahGC",
        }
    }

    /// 显示名称
    pub fn name(self) -> &'static str {
        match self {
            Self::Serial => "SERIAL",
            Self::Parallel => "PARALLEL",
            Self::G1 => "G1",
            Self::Zgc => "ZGC",
            Self::Shenandoah => "SHENANDOAH",
        }
    }

    /// 该收集器的进程终止不可可靠观测，需要看门狗
    pub fn needs_watchdog(self) -> bool {
        matches!(self, Self::Shenandoah)
    }

    /// 全程停顿收集器：STW 时间等于 GC 时间
    pub fn is_fully_stop_the_world(self) -> bool {
        matches!(self, Self::Serial | Self::Parallel)
    }
}

impl fmt::Display for CollectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectorType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            "g1" => Ok(Self::G1),
            "zgc" | "z" => Ok(Self::Zgc),
            "shenandoah" => Ok(Self::Shenandoah),
            other => Err(AnalysisError::InvalidConfiguration(format!(
                "unknown collector type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collector_names() {
        assert_eq!("G1".parse::<CollectorType>().ok(), Some(CollectorType::G1));
        assert_eq!(
            " shenandoah ".parse::<CollectorType>().ok(),
            Some(CollectorType::Shenandoah)
        );
        assert!("cms".parse::<CollectorType>().is_err());
    }

    #[test]
    fn test_only_shenandoah_is_watched() {
        let watched: Vec<_> = CollectorType::ALL
            .into_iter()
            .filter(|c| c.needs_watchdog())
            .collect();
        assert_eq!(watched, vec![CollectorType::Shenandoah]);
    }
}
