// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/merge.rs - 坐标重映射与跨切片去重融合
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

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

use crate::bbox::PixelBox;
use crate::model::{ClassTable, Detection, RawDetection};
use crate::tile::Tile;

/// 检测器返回了退化的边界框，属于检测器契约违背
#[derive(Error, Debug)]
#[error("检测框退化 ({}, {}, {}, {}), 类别 {class_id}", .bbox.x1, .bbox.y1, .bbox.x2, .bbox.y2)]
pub struct MalformedDetection {
  pub bbox: PixelBox,
  pub class_id: u32,
}

#[derive(Error, Debug)]
pub enum MergeError {
  /// 置信度缺失（非有限值）会不可预测地扰动贪心排序，必须立即失败
  #[error("检测缺少有效置信度: 类别 {class_id}, 分数 {score}")]
  InvalidScore { class_id: u32, score: f32 },
}

/// 把切片局部坐标的原始检测换算到全图坐标
pub fn remap(tile: &Tile, raw: RawDetection) -> Result<Detection, MalformedDetection> {
  if !raw.bbox.is_valid() {
    return Err(MalformedDetection {
      bbox: raw.bbox,
      class_id: raw.class_id,
    });
  }

  let (ox, oy) = tile.offset();
  Ok(Detection {
    bbox: raw.bbox.translate(ox, oy),
    class_id: raw.class_id,
    score: raw.score,
  })
}

/// 整幅图像的最终检测集合，按类别分组
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
  classes: BTreeMap<u32, Vec<Detection>>,
}

impl DetectionSet {
  pub fn is_empty(&self) -> bool {
    self.classes.values().all(|boxes| boxes.is_empty())
  }

  /// 全部类别的检测总数
  pub fn len(&self) -> usize {
    self.classes.values().map(|boxes| boxes.len()).sum()
  }

  pub fn class_count(&self) -> usize {
    self.classes.len()
  }

  /// 按类别编号遍历，编号升序
  pub fn per_class(&self) -> impl Iterator<Item = (u32, &[Detection])> {
    self.classes.iter().map(|(id, boxes)| (*id, boxes.as_slice()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Detection> {
    self.classes.values().flatten()
  }

  /// 按类别名称分组的下游视图，未知编号退化为数字字符串
  pub fn group_by_name(&self, table: &ClassTable) -> BTreeMap<String, Vec<PixelBox>> {
    let mut grouped: BTreeMap<String, Vec<PixelBox>> = BTreeMap::new();
    for (class_id, detections) in &self.classes {
      let entry = grouped.entry(table.name_of(*class_id)).or_default();
      entry.extend(detections.iter().map(|d| d.bbox));
    }
    grouped
  }
}

/// 贪心 NMS 融合：按类别独立去重，跨类别的重叠检测互不抑制。
///
/// 类内候选按置信度降序排序，同分时以整数面积降序、再以插入顺序
/// 作为确定性次级键，保证相同输入得到相同输出。
pub fn merge(detections: Vec<Detection>, iou_threshold: f32) -> Result<DetectionSet, MergeError> {
  for detection in &detections {
    if !detection.score.is_finite() {
      return Err(MergeError::InvalidScore {
        class_id: detection.class_id,
        score: detection.score,
      });
    }
  }

  let mut classes: BTreeMap<u32, Vec<Detection>> = BTreeMap::new();
  for detection in detections {
    if !detection.bbox.is_valid() {
      // 单个坏检测不应拖垮整幅图像的结果
      warn!(
        "丢弃退化检测框 ({}, {}, {}, {}), 类别 {}",
        detection.bbox.x1,
        detection.bbox.y1,
        detection.bbox.x2,
        detection.bbox.y2,
        detection.class_id
      );
      continue;
    }
    classes.entry(detection.class_id).or_default().push(detection);
  }

  let mut merged = BTreeMap::new();
  for (class_id, mut candidates) in classes {
    // 稳定排序保留同分同面积候选的插入顺序
    candidates.sort_by(|a, b| {
      b.score
        .total_cmp(&a.score)
        .then_with(|| b.bbox.area().cmp(&a.bbox.area()))
    });
    merged.insert(class_id, suppress(candidates, iou_threshold));
  }

  Ok(DetectionSet { classes: merged })
}

/// 单类别的贪心非极大值抑制
fn suppress(candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  let mut kept = Vec::new();
  let mut suppressed = vec![false; candidates.len()];

  for i in 0..candidates.len() {
    if suppressed[i] {
      continue;
    }
    kept.push(candidates[i]);

    for j in (i + 1)..candidates.len() {
      if !suppressed[j] && candidates[i].bbox.iou(&candidates[j].bbox) > iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(x1: u32, y1: u32, x2: u32, y2: u32, class_id: u32, score: f32) -> Detection {
    Detection {
      bbox: PixelBox::new(x1, y1, x2, y2),
      class_id,
      score,
    }
  }

  fn boxes_of(set: &DetectionSet, class_id: u32) -> Vec<PixelBox> {
    set
      .per_class()
      .find(|(id, _)| *id == class_id)
      .map(|(_, dets)| dets.iter().map(|d| d.bbox).collect())
      .unwrap_or_default()
  }

  #[test]
  fn remap_adds_tile_offset_to_both_corners() {
    let tile = Tile { x0: 100, y0: 200, x1: 300, y1: 400 };
    let raw = RawDetection {
      bbox: PixelBox::new(10, 20, 30, 40),
      class_id: 1,
      score: 0.8,
    };
    let detection = remap(&tile, raw).unwrap();
    assert_eq!(detection.bbox, PixelBox::new(110, 220, 130, 240));
    assert_eq!(detection.class_id, 1);
  }

  #[test]
  fn remap_rejects_degenerate_raw_boxes() {
    let tile = Tile { x0: 0, y0: 0, x1: 100, y1: 100 };
    let raw = RawDetection {
      bbox: PixelBox::new(30, 30, 30, 40),
      class_id: 0,
      score: 0.9,
    };
    assert!(remap(&tile, raw).is_err());
  }

  #[test]
  fn merge_suppresses_lower_score_duplicates() {
    // spec 算例：(0,0,10,10) 被 (1,1,11,11) 抑制，远处的框保留
    let detections = vec![
      det(0, 0, 10, 10, 0, 0.9),
      det(1, 1, 11, 11, 0, 0.95),
      det(50, 50, 60, 60, 0, 0.8),
    ];
    let set = merge(detections, 0.5).unwrap();
    assert_eq!(
      boxes_of(&set, 0),
      vec![PixelBox::new(1, 1, 11, 11), PixelBox::new(50, 50, 60, 60)]
    );
  }

  #[test]
  fn merge_is_idempotent() {
    let detections = vec![
      det(0, 0, 10, 10, 0, 0.9),
      det(1, 1, 11, 11, 0, 0.95),
      det(50, 50, 60, 60, 0, 0.8),
      det(2, 2, 12, 12, 1, 0.7),
    ];
    let first = merge(detections, 0.5).unwrap();
    let again = merge(first.iter().copied().collect(), 0.5).unwrap();
    assert_eq!(first.len(), again.len());
    for (id, dets) in first.per_class() {
      assert_eq!(boxes_of(&again, id), dets.iter().map(|d| d.bbox).collect::<Vec<_>>());
    }
  }

  #[test]
  fn identical_boxes_of_different_classes_are_both_kept() {
    let detections = vec![det(10, 10, 50, 50, 0, 0.9), det(10, 10, 50, 50, 1, 0.9)];
    let set = merge(detections, 0.5).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.class_count(), 2);
  }

  #[test]
  fn no_output_pair_exceeds_threshold_within_a_class() {
    let threshold = 0.4;
    let detections = vec![
      det(0, 0, 100, 100, 3, 0.9),
      det(10, 10, 110, 110, 3, 0.85),
      det(20, 20, 120, 120, 3, 0.8),
      det(300, 300, 400, 400, 3, 0.7),
      det(305, 305, 405, 405, 3, 0.65),
      det(0, 0, 100, 100, 5, 0.6),
    ];
    let set = merge(detections, threshold).unwrap();
    for (_, dets) in set.per_class() {
      for (i, a) in dets.iter().enumerate() {
        for b in dets.iter().skip(i + 1) {
          assert!(a.bbox.iou(&b.bbox) <= threshold);
        }
      }
    }
  }

  #[test]
  fn empty_input_yields_empty_set() {
    let set = merge(Vec::new(), 0.5).unwrap();
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
  }

  #[test]
  fn non_finite_score_fails_fast() {
    let detections = vec![det(0, 0, 10, 10, 0, f32::NAN)];
    assert!(matches!(
      merge(detections, 0.5),
      Err(MergeError::InvalidScore { class_id: 0, .. })
    ));
  }

  #[test]
  fn degenerate_boxes_are_dropped_not_fatal() {
    let detections = vec![det(10, 10, 10, 20, 0, 0.9), det(0, 0, 10, 10, 0, 0.8)];
    let set = merge(detections, 0.5).unwrap();
    assert_eq!(boxes_of(&set, 0), vec![PixelBox::new(0, 0, 10, 10)]);
  }

  #[test]
  fn equal_scores_break_ties_by_area_descending() {
    // 同分重叠候选：面积大的 (0,0,12,12) 胜出
    let detections = vec![det(1, 1, 11, 11, 0, 0.9), det(0, 0, 12, 12, 0, 0.9)];
    let set = merge(detections, 0.5).unwrap();
    assert_eq!(boxes_of(&set, 0), vec![PixelBox::new(0, 0, 12, 12)]);
  }

  #[test]
  fn group_by_name_resolves_and_degrades() {
    let detections = vec![det(0, 0, 10, 10, 0, 0.9), det(20, 20, 30, 30, 9, 0.8)];
    let set = merge(detections, 0.5).unwrap();
    let table = ClassTable::new(vec!["field".to_string()]);
    let grouped = set.group_by_name(&table);
    assert_eq!(grouped["field"], vec![PixelBox::new(0, 0, 10, 10)]);
    assert_eq!(grouped["9"], vec![PixelBox::new(20, 20, 30, 30)]);
  }
}
