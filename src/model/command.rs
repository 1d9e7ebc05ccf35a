// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/model/command.rs - 外部命令检测器
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

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbImage;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::bbox::PixelBox;
use crate::model::{Detector, RawDetection};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum CommandDetectorError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("检测器输出不是合法 JSON: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("检测器输出格式错误: {0}")]
  BadRecord(String),
  #[error("检测器进程异常退出: {0:?}")]
  DetectorExited(Option<i32>),
}

/// 黑盒外部检测器：把切片写入临时 PNG，调用外部程序，
/// 从标准输出解析 JSON 检测列表。
///
/// 约定格式为数组，每项 `{"bbox": [x1, y1, x2, y2], "class_id": n, "score": s}`，
/// 坐标为切片局部整数像素。
pub struct CommandDetector {
  program: PathBuf,
  work_dir: PathBuf,
  counter: AtomicU64,
}

impl FromUrlWithScheme for CommandDetector {
  const SCHEME: &'static str = "exec";
}

impl FromUrl for CommandDetector {
  type Error = CommandDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CommandDetectorError::SchemeMismatch);
    }

    Ok(Self {
      program: PathBuf::from(url.path()),
      work_dir: std::env::temp_dir().join("xuntian-tiles"),
      counter: AtomicU64::new(0),
    })
  }
}

impl CommandDetector {
  pub fn new(program: PathBuf) -> Self {
    Self {
      program,
      work_dir: std::env::temp_dir().join("xuntian-tiles"),
      counter: AtomicU64::new(0),
    }
  }
}

impl Detector for CommandDetector {
  type Region = RgbImage;
  type Error = CommandDetectorError;

  fn detect(&self, region: &Self::Region) -> Result<Vec<RawDetection>, Self::Error> {
    let index = self.counter.fetch_add(1, Ordering::Relaxed);
    std::fs::create_dir_all(&self.work_dir)?;
    let tile_path = self
      .work_dir
      .join(format!("tile-{}-{}.png", std::process::id(), index));

    region.save(&tile_path)?;
    debug!("调用外部检测器: {} {}", self.program.display(), tile_path.display());

    let output = Command::new(&self.program).arg(&tile_path).output();
    let _ = std::fs::remove_file(&tile_path);
    let output = output?;

    if !output.status.success() {
      return Err(CommandDetectorError::DetectorExited(output.status.code()));
    }

    parse_detections(&output.stdout)
  }
}

/// 解析外部检测器的 JSON 输出
fn parse_detections(stdout: &[u8]) -> Result<Vec<RawDetection>, CommandDetectorError> {
  let value: serde_json::Value = serde_json::from_slice(stdout)?;
  let items = value
    .as_array()
    .ok_or_else(|| CommandDetectorError::BadRecord("期望 JSON 数组".to_string()))?;

  let mut detections = Vec::with_capacity(items.len());
  for item in items {
    let bbox = item
      .get("bbox")
      .and_then(|b| b.as_array())
      .filter(|b| b.len() == 4)
      .ok_or_else(|| CommandDetectorError::BadRecord("缺少 bbox 字段或长度不为 4".to_string()))?;

    let mut corners = [0u32; 4];
    for (corner, value) in corners.iter_mut().zip(bbox) {
      *corner = value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| CommandDetectorError::BadRecord("bbox 坐标必须为非负整数".to_string()))?;
    }

    let class_id = item
      .get("class_id")
      .and_then(|v| v.as_u64())
      .and_then(|v| u32::try_from(v).ok())
      .ok_or_else(|| CommandDetectorError::BadRecord("缺少 class_id 字段".to_string()))?;

    // 缺失置信度按契约违背处理，不得默认补分
    let score = item
      .get("score")
      .and_then(|v| v.as_f64())
      .ok_or_else(|| CommandDetectorError::BadRecord("缺少 score 字段".to_string()))?;

    detections.push(RawDetection {
      bbox: PixelBox::new(corners[0], corners[1], corners[2], corners[3]),
      class_id,
      score: score as f32,
    });
  }

  Ok(detections)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_detection_list() {
    let stdout = br#"[
      {"bbox": [0, 0, 10, 10], "class_id": 2, "score": 0.9},
      {"bbox": [5, 5, 20, 30], "class_id": 0, "score": 0.5}
    ]"#;
    let detections = parse_detections(stdout).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].bbox, PixelBox::new(0, 0, 10, 10));
    assert_eq!(detections[0].class_id, 2);
    assert!((detections[1].score - 0.5).abs() < 1e-6);
  }

  #[test]
  fn empty_array_yields_no_detections() {
    assert!(parse_detections(b"[]").unwrap().is_empty());
  }

  #[test]
  fn missing_score_is_a_contract_violation() {
    let stdout = br#"[{"bbox": [0, 0, 10, 10], "class_id": 1}]"#;
    assert!(matches!(
      parse_detections(stdout),
      Err(CommandDetectorError::BadRecord(_))
    ));
  }

  #[test]
  fn non_array_output_is_rejected() {
    assert!(matches!(
      parse_detections(b"{}"),
      Err(CommandDetectorError::BadRecord(_))
    ));
  }
}
