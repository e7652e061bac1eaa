//! 运行时命令构建
//!
//! 将（收集器类型，初始堆，最大堆）映射为有序的运行时参数列表：
//! 堆大小参数、收集器专属的诊断日志通道、运行时选项、收集器选择参数、入口点。

use crate::collector::CollectorType;
use crate::config::{INITIAL_HEAP_RANGE_MB, MAX_HEAP_RANGE_MB};
use crate::error::{AnalysisError, Result};

/// 统一日志通道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChannel {
    /// 行前缀装饰：运行时间、级别、标签
    Decorations,
    Gc,
    GcStart,
    GcInit,
    GcLoad,
    GcCpu,
    GcHeap,
    GcHeapExit,
    GcHeapCoops,
    GcMetaspace,
    GcPhases,
    GcPhasesStart,
    GcMmu,
    GcMarking,
    GcReloc,
    GcNMethod,
    GcRef,
    GcTask,
    GcCds,
    GcErgo,
    GcStats,
}

impl LogChannel {
    /// 对应的 `-Xlog` 参数
    pub fn flag(self) -> &'static str {
        match self {
            Self::Decorations => "-Xlog:::uptime,level,tags",
            Self::Gc => "-Xlog:gc",
            Self::GcStart => "-Xlog:gc+start",
            Self::GcInit => "-Xlog:gc+init",
            Self::GcLoad => "-Xlog:gc+load",
            Self::GcCpu => "-Xlog:gc+cpu",
            Self::GcHeap => "-Xlog:gc+heap",
            Self::GcHeapExit => "-Xlog:gc+heap+exit",
            Self::GcHeapCoops => "-Xlog:gc+heap+coops",
            Self::GcMetaspace => "-Xlog:gc+metaspace",
            Self::GcPhases => "-Xlog:gc+phases",
            Self::GcPhasesStart => "-Xlog:gc+phases+start",
            Self::GcMmu => "-Xlog:gc+mmu",
            Self::GcMarking => "-Xlog:gc+marking",
            Self::GcReloc => "-Xlog:gc+reloc",
            Self::GcNMethod => "-Xlog:gc+nmethod",
            Self::GcRef => "-Xlog:gc+ref",
            Self::GcTask => "-Xlog:gc+task",
            Self::GcCds => "-Xlog:gc+cds",
            Self::GcErgo => "-Xlog:gc+ergo",
            Self::GcStats => "-Xlog:gc+stats",
        }
    }

    /// 收集器专属的诊断日志通道表
    pub fn table_for(collector: CollectorType) -> &'static [LogChannel] {
        use LogChannel::*;

        const STOP_THE_WORLD: &[LogChannel] = &[
            Decorations,
            GcStart,
            GcHeap,
            GcMetaspace,
            GcCpu,
            GcHeapExit,
            GcHeapCoops,
            GcPhases,
            GcPhasesStart,
        ];
        const G1: &[LogChannel] = &[
            Decorations,
            GcStart,
            GcHeap,
            GcMetaspace,
            GcCpu,
            GcHeapExit,
            GcHeapCoops,
            GcPhases,
            GcPhasesStart,
            GcTask,
            GcCds,
        ];
        const ZGC: &[LogChannel] = &[
            Decorations,
            GcStart,
            GcHeap,
            GcMetaspace,
            GcCpu,
            GcHeapExit,
            GcHeapCoops,
            GcPhases,
            GcPhasesStart,
            GcInit,
            GcLoad,
            GcMmu,
            GcMarking,
            GcReloc,
            GcNMethod,
            GcRef,
        ];
        const SHENANDOAH: &[LogChannel] = &[
            Decorations,
            Gc,
            GcInit,
            GcStats,
            GcHeapExit,
            GcMetaspace,
            GcErgo,
        ];

        match collector {
            CollectorType::Serial | CollectorType::Parallel => STOP_THE_WORLD,
            CollectorType::G1 => G1,
            CollectorType::Zgc => ZGC,
            CollectorType::Shenandoah => SHENANDOAH,
        }
    }
}

/// 非日志类运行时选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeOption {
    VerboseGc,
    UnlockExperimental,
}

impl RuntimeOption {
    pub fn flag(self) -> &'static str {
        match self {
            Self::VerboseGc => "-verbose:gc",
            Self::UnlockExperimental => "-XX:+UnlockExperimentalVMOptions",
        }
    }

    pub fn table_for(collector: CollectorType) -> &'static [RuntimeOption] {
        match collector {
            CollectorType::Serial | CollectorType::Parallel | CollectorType::G1 => {
                &[Self::VerboseGc]
            }
            CollectorType::Zgc | CollectorType::Shenandoah => {
                &[Self::VerboseGc, Self::UnlockExperimental]
            }
        }
    }
}

/// 一次运行的已校验命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub collector: CollectorType,
    pub initial_heap_mb: u32,
    pub max_heap_mb: u32,
    pub log_channels: &'static [LogChannel],
    pub runtime_options: &'static [RuntimeOption],
    pub entry_point: String,
}

impl LaunchCommand {
    /// 构建命令，堆大小越界时返回 `InvalidConfiguration`
    pub fn build(
        collector: CollectorType,
        initial_heap_mb: u32,
        max_heap_mb: u32,
        entry_point: &str,
    ) -> Result<Self> {
        let (min_xms, max_xms) = INITIAL_HEAP_RANGE_MB;
        if !(min_xms..=max_xms).contains(&initial_heap_mb) {
            log::error!("Invalid argument for initial heap size: {initial_heap_mb}");
            return Err(AnalysisError::InvalidConfiguration(format!(
                "initial heap size must be between {min_xms}MB and {max_xms}MB, got {initial_heap_mb}MB"
            )));
        }
        let (min_xmx, max_xmx) = MAX_HEAP_RANGE_MB;
        if !(min_xmx..=max_xmx).contains(&max_heap_mb) {
            log::error!("Invalid argument for maximum heap size: {max_heap_mb}");
            return Err(AnalysisError::InvalidConfiguration(format!(
                "maximum heap size must be between {min_xmx}MB and {max_xmx}MB, got {max_heap_mb}MB"
            )));
        }
        if entry_point.trim().is_empty() {
            return Err(AnalysisError::InvalidConfiguration(
                "entry point must not be empty".to_string(),
            ));
        }

        Ok(Self {
            collector,
            initial_heap_mb,
            max_heap_mb,
            log_channels: LogChannel::table_for(collector),
            runtime_options: RuntimeOption::table_for(collector),
            entry_point: entry_point.to_string(),
        })
    }

    pub fn heap_flags(&self) -> [String; 2] {
        [
            format!("-Xms{}m", self.initial_heap_mb),
            format!("-Xmx{}m", self.max_heap_mb),
        ]
    }

    /// 有序参数列表（不含运行时可执行文件本身）
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(
            2 + self.log_channels.len() + self.runtime_options.len() + 2,
        );
        args.extend(self.heap_flags());
        args.extend(self.log_channels.iter().map(|c| c.flag().to_string()));
        args.extend(self.runtime_options.iter().map(|o| o.flag().to_string()));
        args.push(self.collector.selection_flag().to_string());
        args.push(self.entry_point.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_tables_per_collector() -> Result<()> {
        let expected = [
            (CollectorType::Serial, 9, 1),
            (CollectorType::Parallel, 9, 1),
            (CollectorType::G1, 11, 1),
            (CollectorType::Zgc, 16, 2),
            (CollectorType::Shenandoah, 7, 2),
        ];
        for (collector, channels, options) in expected {
            let command = LaunchCommand::build(collector, 200, 400, "App")?;
            assert_eq!(command.heap_flags().len(), 2);
            assert_eq!(command.log_channels.len(), channels, "{collector}");
            assert_eq!(command.runtime_options.len(), options, "{collector}");
        }
        Ok(())
    }

    #[test]
    fn test_argument_order() -> Result<()> {
        let command = LaunchCommand::build(CollectorType::Shenandoah, 200, 400, "App")?;
        let args = command.args();
        assert_eq!(args[0], "-Xms200m");
        assert_eq!(args[1], "-Xmx400m");
        assert!(args[2].starts_with("-Xlog"));
        let unlock = args
            .iter()
            .position(|a| a == "-XX:+UnlockExperimentalVMOptions");
        let select = args.iter().position(|a| a == "-XX:+UseShenandoahGC");
        assert!(unlock < select);
        assert_eq!(args.last().map(String::as_str), Some("App"));
        assert_eq!(args.len(), 2 + 7 + 2 + 1 + 1);
        Ok(())
    }

    #[test]
    fn test_heap_bounds() {
        assert!(LaunchCommand::build(CollectorType::Shenandoah, 0, 400, "App").is_err());
        assert!(LaunchCommand::build(CollectorType::Shenandoah, 1, 15, "App").is_err());
        assert!(LaunchCommand::build(CollectorType::Serial, 2049, 4000, "App").is_err());
        assert!(LaunchCommand::build(CollectorType::Serial, 1, 8193, "App").is_err());
        assert!(LaunchCommand::build(CollectorType::Serial, 2048, 8192, "App").is_ok());
        assert!(LaunchCommand::build(CollectorType::Serial, 1, 16, " ").is_err());
    }
}
