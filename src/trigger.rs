// 该文件是 Thermal Dataset 项目的一部分。
// src/trigger.rs - 重新训练触发条件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::{debug, info};

pub const DEFAULT_RETRAIN_THRESHOLD: usize = 5;

/// 记录上一次同步时的记录数，新增数量达到阈值时触发同步与重新训练
///
/// 基线从 0 开始，只有同步成功后调用 [`RetrainTrigger::mark_synced`] 才会前移，
/// 失败的同步会在下一次检查时重试。
#[derive(Debug, Clone)]
pub struct RetrainTrigger {
  baseline: usize,
  threshold: usize,
}

impl Default for RetrainTrigger {
  fn default() -> Self {
    RetrainTrigger::new(DEFAULT_RETRAIN_THRESHOLD)
  }
}

impl RetrainTrigger {
  pub fn new(threshold: usize) -> Self {
    RetrainTrigger {
      baseline: 0,
      threshold: threshold.max(1),
    }
  }

  pub fn baseline(&self) -> usize {
    self.baseline
  }

  pub fn threshold(&self) -> usize {
    self.threshold
  }

  /// 检查当前记录数是否达到触发条件
  ///
  /// 记录数减少时（后端删除了记录）基线直接下调，不触发。
  pub fn check(&mut self, current: usize) -> bool {
    if current < self.baseline {
      info!("记录数从 {} 减少到 {}, 重置基线", self.baseline, current);
      self.baseline = current;
      return false;
    }

    let growth = current - self.baseline;
    debug!("新增记录 {} 条, 阈值 {}", growth, self.threshold);
    growth >= self.threshold
  }

  /// 以同步时实际处理的记录数作为新的基线
  pub fn mark_synced(&mut self, current: usize) {
    self.baseline = current;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn triggers_at_threshold_growth() {
    let mut trigger = RetrainTrigger::default();
    assert!(!trigger.check(4));
    assert!(trigger.check(5));
    trigger.mark_synced(5);

    assert!(!trigger.check(9));
    assert!(trigger.check(10));
    assert!(trigger.check(12));
    trigger.mark_synced(12);
    assert_eq!(trigger.baseline(), 12);
    assert!(!trigger.check(12));
  }

  #[test]
  fn unsynced_growth_keeps_accumulating() {
    let mut trigger = RetrainTrigger::new(5);
    trigger.mark_synced(20);
    assert!(trigger.check(26));
    // 同步失败，没有调用 mark_synced
    assert!(trigger.check(26));
    assert_eq!(trigger.baseline(), 20);
  }

  #[test]
  fn shrinking_count_rebases_without_triggering() {
    let mut trigger = RetrainTrigger::new(5);
    trigger.mark_synced(30);
    assert!(!trigger.check(3));
    assert_eq!(trigger.baseline(), 3);
    assert!(trigger.check(8));
  }

  #[test]
  fn zero_threshold_is_clamped() {
    let mut trigger = RetrainTrigger::new(0);
    assert_eq!(trigger.threshold(), 1);
    assert!(!trigger.check(0));
    assert!(trigger.check(1));
  }
}
