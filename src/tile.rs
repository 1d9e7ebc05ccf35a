// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/tile.rs - 切片调度
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

use crate::config::FusionConfig;

/// 图像内的一个矩形切片窗口，[x0, x1) × [y0, y1)，(x0, y0) 即重映射偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
  pub x0: u32,
  pub y0: u32,
  pub x1: u32,
  pub y1: u32,
}

impl Tile {
  pub fn width(&self) -> u32 {
    self.x1 - self.x0
  }

  pub fn height(&self) -> u32 {
    self.y1 - self.y0
  }

  /// 切片原点在全图中的偏移
  pub fn offset(&self) -> (u32, u32) {
    (self.x0, self.y0)
  }
}

/// 以步长 stride 的格点遍历图像，窗口按图像边界收缩，
/// 收缩后任一边长低于 min_tile_fraction × tile_size 的碎片切片丢弃。
/// 行优先顺序，纯函数，重复调用结果一致。
pub fn schedule(width: u32, height: u32, config: &FusionConfig) -> Vec<Tile> {
  let tile_size = config.tile_size;
  let stride = config.stride();
  let min_side = config.min_tile_fraction as f64 * tile_size as f64;

  let mut tiles = Vec::new();
  let mut y0 = 0u32;
  while y0 < height {
    let mut x0 = 0u32;
    while x0 < width {
      let x1 = x0.saturating_add(tile_size).min(width);
      let y1 = y0.saturating_add(tile_size).min(height);
      let tile = Tile { x0, y0, x1, y1 };

      if (tile.width() as f64) >= min_side && (tile.height() as f64) >= min_side {
        tiles.push(tile);
      }

      x0 = match x0.checked_add(stride) {
        Some(next) => next,
        None => break,
      };
    }
    y0 = match y0.checked_add(stride) {
      Some(next) => next,
      None => break,
    };
  }

  tiles
}

/// 调度前的切片数量上界（含之后会被丢弃的碎片），用于资源预检
pub fn tile_count_upper_bound(width: u32, height: u32, config: &FusionConfig) -> usize {
  let stride = config.stride() as u64;
  let cols = (width as u64).div_ceil(stride);
  let rows = (height as u64).div_ceil(stride);
  usize::try_from(cols.saturating_mul(rows)).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(tile_size: u32, overlap: f32, min_tile_fraction: f32) -> FusionConfig {
    FusionConfig {
      tile_size,
      overlap,
      min_tile_fraction,
      ..FusionConfig::default()
    }
  }

  #[test]
  fn single_tile_covers_small_image() {
    let tiles = schedule(100, 80, &config(128, 0.0, 0.25));
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0], Tile { x0: 0, y0: 0, x1: 100, y1: 80 });
  }

  #[test]
  fn edge_slivers_are_discarded() {
    // 120 像素宽，切片 100：第二列只剩 20 < 25，丢弃
    let tiles = schedule(120, 100, &config(100, 0.0, 0.25));
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0], Tile { x0: 0, y0: 0, x1: 100, y1: 100 });

    // 130 像素宽时第二列剩 30 >= 25，保留
    let tiles = schedule(130, 100, &config(100, 0.0, 0.25));
    assert_eq!(tiles.len(), 2);
    assert_eq!(tiles[1], Tile { x0: 100, y0: 0, x1: 130, y1: 100 });
  }

  #[test]
  fn tiles_are_row_major() {
    let tiles = schedule(250, 250, &config(100, 0.0, 0.0));
    for pair in tiles.windows(2) {
      let earlier = (pair[0].y0, pair[0].x0);
      let later = (pair[1].y0, pair[1].x0);
      assert!(earlier < later, "切片顺序必须为行优先");
    }
  }

  #[test]
  fn schedule_is_deterministic() {
    let config = config(1200, 0.165, 0.25);
    let first = schedule(3000, 2000, &config);
    let second = schedule(3000, 2000, &config);
    assert!(!first.is_empty());
    assert_eq!(first, second);
  }

  #[test]
  fn every_pixel_is_covered_or_near_discard_margin() {
    let (width, height) = (3000u32, 2000u32);
    let config = config(1200, 0.165, 0.25);
    let tiles = schedule(width, height, &config);

    let mut covered = vec![false; (width * height) as usize];
    for tile in &tiles {
      for y in tile.y0..tile.y1 {
        let row = (y * width) as usize;
        for x in tile.x0..tile.x1 {
          covered[row + x as usize] = true;
        }
      }
    }

    let margin = (config.min_tile_fraction as f64 * config.tile_size as f64) as u32;
    for y in 0..height {
      for x in 0..width {
        if !covered[(y * width + x) as usize] {
          let near_right = x + margin >= width;
          let near_bottom = y + margin >= height;
          assert!(
            near_right || near_bottom,
            "像素 ({x}, {y}) 未被覆盖且不在边缘丢弃范围内"
          );
        }
      }
    }
  }

  #[test]
  fn overlapping_tiles_share_pixels() {
    let tiles = schedule(1000, 1000, &config(640, 0.5, 0.25));
    assert!(tiles.len() > 1);
    let a = &tiles[0];
    let b = &tiles[1];
    assert!(b.x0 < a.x1, "相邻切片必须重叠");
  }

  #[test]
  fn upper_bound_dominates_actual_count() {
    let config = config(640, 0.25, 0.25);
    let tiles = schedule(3000, 2000, &config);
    assert!(tiles.len() <= tile_count_upper_bound(3000, 2000, &config));
  }
}
