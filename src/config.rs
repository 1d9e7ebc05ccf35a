// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/config.rs - 融合管线配置
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

use thiserror::Error;

/// 单个切片检测失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
  /// 任一切片失败立即中止整幅图像
  FailFast,
  /// 记录警告并将该切片视为空结果继续
  #[default]
  SkipAndContinue,
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("切片边长必须为正整数, 实际 {0}")]
  InvalidTileSize(u32),
  #[error("切片重叠率必须位于 [0, 1), 实际 {0}")]
  InvalidOverlap(f32),
  #[error("NMS IoU 阈值必须位于 [0, 1], 实际 {0}")]
  InvalidIouThreshold(f32),
  #[error("最小切片比例必须位于 [0, 1], 实际 {0}")]
  InvalidMinTileFraction(f32),
  #[error("工作线程数必须为正整数")]
  InvalidWorkers,
}

/// 切片与融合参数，运行前整体校验
#[derive(Debug, Clone)]
pub struct FusionConfig {
  /// 方形切片的像素边长
  pub tile_size: u32,
  /// 相邻切片重叠占切片边长的比例
  pub overlap: f32,
  /// 同类检测去重的 IoU 阈值
  pub iou_threshold: f32,
  /// 低于 tile_size 的该比例的边缘切片直接丢弃
  pub min_tile_fraction: f32,
  /// 检测器失败策略
  pub failure_policy: FailurePolicy,
  /// 并发调用检测器的工作线程数
  pub workers: usize,
}

impl Default for FusionConfig {
  fn default() -> Self {
    Self {
      tile_size: 1200,
      overlap: 0.165,
      iou_threshold: 0.45,
      min_tile_fraction: 0.25,
      failure_policy: FailurePolicy::default(),
      workers: 1,
    }
  }
}

impl FusionConfig {
  /// 在调度任何切片之前同步校验全部参数
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.tile_size == 0 {
      return Err(ConfigError::InvalidTileSize(self.tile_size));
    }
    if !self.overlap.is_finite() || !(0.0..1.0).contains(&self.overlap) {
      return Err(ConfigError::InvalidOverlap(self.overlap));
    }
    if !self.iou_threshold.is_finite() || !(0.0..=1.0).contains(&self.iou_threshold) {
      return Err(ConfigError::InvalidIouThreshold(self.iou_threshold));
    }
    if !self.min_tile_fraction.is_finite() || !(0.0..=1.0).contains(&self.min_tile_fraction) {
      return Err(ConfigError::InvalidMinTileFraction(self.min_tile_fraction));
    }
    if self.workers == 0 {
      return Err(ConfigError::InvalidWorkers);
    }
    Ok(())
  }

  /// 切片行进步长：stride = max(1, floor(tile_size × (1 − overlap)))
  pub fn stride(&self) -> u32 {
    let stride = (self.tile_size as f64 * (1.0 - self.overlap as f64)).floor() as u32;
    stride.max(1)
  }
}
