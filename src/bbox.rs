// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/bbox.rs - 像素坐标边界框
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

/// IoU 分母下限，避免退化框导致除零
const UNION_EPSILON: f32 = 1e-6;

/// 轴对齐边界框，整数像素坐标，半开区间 [x1, x2) × [y1, y2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl PixelBox {
  pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> u32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> u32 {
    self.y2.saturating_sub(self.y1)
  }

  pub fn area(&self) -> u64 {
    self.width() as u64 * self.height() as u64
  }

  /// 合法框要求两个方向均有正的跨度
  pub fn is_valid(&self) -> bool {
    self.x1 < self.x2 && self.y1 < self.y2
  }

  /// 整体平移，用于切片坐标到全图坐标的换算
  pub fn translate(&self, dx: u32, dy: u32) -> Self {
    Self {
      x1: self.x1 + dx,
      y1: self.y1 + dy,
      x2: self.x2 + dx,
      y2: self.y2 + dy,
    }
  }

  pub fn intersection_area(&self, other: &Self) -> u64 {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);

    if x2 <= x1 || y2 <= y1 {
      return 0;
    }

    (x2 - x1) as u64 * (y2 - y1) as u64
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &Self) -> f32 {
    let intersection = self.intersection_area(other) as f32;
    let union = (self.area() + other.area()) as f32 - intersection;

    intersection / union.max(UNION_EPSILON)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = PixelBox::new(10, 10, 20, 20);
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = PixelBox::new(0, 0, 10, 10);
    let b = PixelBox::new(50, 50, 60, 60);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_of_offset_boxes() {
    // 10x10 框偏移 (1,1)：交集 81，并集 119
    let a = PixelBox::new(0, 0, 10, 10);
    let b = PixelBox::new(1, 1, 11, 11);
    let expected = 81.0 / 119.0;
    assert!((a.iou(&b) - expected).abs() < 1e-5);
  }

  #[test]
  fn degenerate_boxes_do_not_divide_by_zero() {
    let a = PixelBox::new(5, 5, 5, 5);
    let b = PixelBox::new(5, 5, 5, 5);
    assert!(!a.is_valid());
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn translate_shifts_both_corners() {
    let a = PixelBox::new(1, 2, 3, 4);
    assert_eq!(a.translate(10, 20), PixelBox::new(11, 22, 13, 24));
  }
}
