// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化与坐标清单
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::merge::DetectionSet;
use crate::model::{ClassTable, Detection};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

/// 类别调色板，按 class_id 取模
pub const CLASS_COLORS: [[u8; 3]; 20] = [
  [255, 0, 0],
  [0, 255, 0],
  [0, 0, 255],
  [255, 255, 0],
  [0, 255, 255],
  [255, 0, 255],
  [192, 192, 192],
  [128, 128, 128],
  [128, 0, 0],
  [128, 128, 0],
  [0, 128, 0],
  [128, 0, 128],
  [0, 128, 128],
  [0, 0, 128],
  [72, 61, 139],
  [47, 79, 79],
  [47, 79, 47],
  [0, 206, 209],
  [148, 0, 211],
  [255, 20, 147],
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在整幅图像上绘制融合后的检测框与标签。
/// 未提供字体时只画边框，不画标签。
pub struct Draw {
  font: Option<FontVec>,
  class_table: ClassTable,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(ClassTable::default())
  }
}

impl Draw {
  pub fn new(class_table: ClassTable) -> Self {
    Self {
      font: None,
      class_table,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
    }
  }

  /// 从字体文件加载标签字体
  pub fn with_font_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    self.font = Some(FontVec::try_from_vec(data)?);
    Ok(self)
  }

  fn class_color(class_id: u32) -> [u8; 3] {
    CLASS_COLORS[class_id as usize % CLASS_COLORS.len()]
  }

  /// 绘制一个全图坐标的检测框
  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let color = Self::class_color(detection.class_id);

    // Clamp to image bounds
    let x_min = (detection.bbox.x1 as i64).clamp(0, w - 1) as i32;
    let y_min = (detection.bbox.y1 as i64).clamp(0, h - 1) as i32;
    let x_max = (detection.bbox.x2 as i64).clamp(0, w) as i32;
    let y_max = (detection.bbox.y2 as i64).clamp(0, h) as i32;

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗
    for thickness in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * thickness;
      let height = y_max - y_min - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness)
        .of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!(
      "{} {:.2}",
      self.class_table.name_of(detection.class_id),
      detection.score
    );

    let scale = PxScale::from(self.font_size);
    let text_color = Rgb([255u8, 255u8, 255u8]);

    // 估算文本大小（粗略估计）
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 标签背景放在边框上方
    let label_x = x_min.max(0);
    let label_y = (y_min - text_height).max(0);

    let max_width = (w as i32 - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;
    let label_height = text_height as u32;

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, Rgb(color));

      draw_text_mut(
        image,
        text_color,
        label_x,
        label_y + self.label_text_vertical_padding,
        scale,
        font,
        &label,
      );
    }
  }

  /// 在原图副本上标注整个检测集合
  pub fn annotate(&self, image: &RgbImage, result: &DetectionSet) -> RgbImage {
    let mut annotated = image.clone();
    for detection in result.iter() {
      self.draw_detection(&mut annotated, detection);
    }
    annotated
  }
}

/// 按类别分组的坐标清单输出
pub struct Record {
  /// true 时使用类别名称，否则使用类别编号
  pub label_with_name: bool,
}

impl Record {
  fn grouped(
    &self,
    result: &DetectionSet,
    table: &ClassTable,
  ) -> std::collections::BTreeMap<String, Vec<crate::bbox::PixelBox>> {
    if self.label_with_name {
      result.group_by_name(table)
    } else {
      result.group_by_name(&ClassTable::default())
    }
  }

  /// 坐标清单文本，每个类别一段
  pub fn record(
    &self,
    result: &DetectionSet,
    table: &ClassTable,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    let mut lines = Vec::new();
    for (name, boxes) in self.grouped(result, table) {
      lines.push(format!("{name}:"));
      for bbox in boxes {
        lines.push(format!(
          "Coordinates: ({}, {}, {}, {})",
          bbox.x1, bbox.y1, bbox.x2, bbox.y2
        ));
      }
    }
    std::fs::write(path.with_extension("txt"), lines.join("\n"))?;
    Ok(())
  }

  /// JSON 报告，类别名映射到坐标数组
  pub fn record_json(
    &self,
    result: &DetectionSet,
    table: &ClassTable,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    let mut report = serde_json::Map::new();
    for (name, boxes) in self.grouped(result, table) {
      let coords: Vec<serde_json::Value> = boxes
        .iter()
        .map(|b| serde_json::json!([b.x1, b.y1, b.x2, b.y2]))
        .collect();
      report.insert(name, serde_json::Value::Array(coords));
    }

    let body = serde_json::to_string_pretty(&serde_json::Value::Object(report))
      .map_err(std::io::Error::other)?;
    std::fs::write(path.with_extension("json"), body)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bbox::PixelBox;

  fn sample_set() -> DetectionSet {
    let detections = vec![
      Detection {
        bbox: PixelBox::new(5, 5, 20, 20),
        class_id: 0,
        score: 0.9,
      },
      Detection {
        bbox: PixelBox::new(30, 30, 40, 45),
        class_id: 1,
        score: 0.8,
      },
    ];
    crate::merge::merge(detections, 0.5).unwrap()
  }

  #[test]
  fn annotate_marks_box_edges() {
    let draw = Draw::default();
    let image = RgbImage::new(64, 64);
    let annotated = draw.annotate(&image, &sample_set());

    // 第一个框的左上角落在类别 0 的颜色上
    assert_eq!(annotated.get_pixel(5, 5), &Rgb(CLASS_COLORS[0]));
    // 原图不受影响
    assert_eq!(image.get_pixel(5, 5), &Rgb([0, 0, 0]));
  }

  #[test]
  fn record_writes_grouped_coordinate_listing() {
    let table = ClassTable::new(vec!["tree".to_string(), "building".to_string()]);
    let record = Record { label_with_name: true };
    let path = std::env::temp_dir().join(format!("xuntian-record-{}", std::process::id()));

    record.record(&sample_set(), &table, &path).unwrap();
    let body = std::fs::read_to_string(path.with_extension("txt")).unwrap();
    let _ = std::fs::remove_file(path.with_extension("txt"));

    assert!(body.contains("tree:"));
    assert!(body.contains("Coordinates: (5, 5, 20, 20)"));
    assert!(body.contains("building:"));
    assert!(body.contains("Coordinates: (30, 30, 40, 45)"));
  }

  #[test]
  fn record_json_maps_class_names_to_boxes() {
    let table = ClassTable::new(vec!["tree".to_string(), "building".to_string()]);
    let record = Record { label_with_name: true };
    let path = std::env::temp_dir().join(format!("xuntian-json-{}", std::process::id()));

    record.record_json(&sample_set(), &table, &path).unwrap();
    let body = std::fs::read_to_string(path.with_extension("json")).unwrap();
    let _ = std::fs::remove_file(path.with_extension("json"));

    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["tree"][0], serde_json::json!([5, 5, 20, 20]));
    assert_eq!(value["building"][0], serde_json::json!([30, 30, 40, 45]));
  }
}
