//! 堆大小扫描步进计划

use serde::{Deserialize, Serialize};

use crate::config::SweepConfig;

/// 初始堆大小上限（MB）
pub const MAX_INITIAL_HEAP_MB: u32 = 2048;
/// 最大堆大小上限（MB）
pub const MAX_MAX_HEAP_MB: u32 = 8192;

/// 某一步使用的堆大小
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSizes {
    pub initial_mb: u32,
    pub max_mb: u32,
}

impl HeapSizes {
    /// 两个上限同时到达
    pub fn at_ceiling(&self) -> bool {
        self.initial_mb == MAX_INITIAL_HEAP_MB && self.max_mb == MAX_MAX_HEAP_MB
    }
}

/// 堆大小计划
///
/// 每次过早中断会把计划回退一步，使被作废的堆大小以相同取值重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSchedule {
    initial_heap_mb: u32,
    initial_max_heap_mb: u32,
    heap_increment_mb: u32,
    max_heap_increment_mb: u32,
}

impl HeapSchedule {
    pub fn new(
        initial_heap_mb: u32,
        initial_max_heap_mb: u32,
        heap_increment_mb: u32,
        max_heap_increment_mb: u32,
    ) -> Self {
        Self {
            initial_heap_mb,
            initial_max_heap_mb,
            heap_increment_mb,
            max_heap_increment_mb,
        }
    }

    /// 第 `step` 步的堆大小，已扣除 `premature_interrupts` 次回退
    pub fn size(&self, step: u32, premature_interrupts: u32) -> HeapSizes {
        let effective = u64::from(step.saturating_sub(premature_interrupts));
        HeapSizes {
            initial_mb: capped(
                self.initial_heap_mb,
                self.heap_increment_mb,
                effective,
                MAX_INITIAL_HEAP_MB,
            ),
            max_mb: capped(
                self.initial_max_heap_mb,
                self.max_heap_increment_mb,
                effective,
                MAX_MAX_HEAP_MB,
            ),
        }
    }
}

impl From<&SweepConfig> for HeapSchedule {
    fn from(config: &SweepConfig) -> Self {
        Self::new(
            config.initial_heap_mb,
            config.initial_max_heap_mb,
            config.heap_increment_mb,
            config.max_heap_increment_mb,
        )
    }
}

fn capped(base: u32, increment: u32, steps: u64, cap: u32) -> u32 {
    let value = u64::from(base) + steps * u64::from(increment);
    // 结果不超过 cap，转换不会失败
    u32::try_from(value.min(u64::from(cap))).unwrap_or(cap)
}
