// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::atomic::{AtomicU32, Ordering};

use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::merge::DetectionSet;
use crate::model::ClassTable;
use crate::output::draw::{Draw, Record};
use crate::output::Render;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把一次巡查的全部产物写入一个目录：
/// 标注图像、坐标清单文本，以及可选的 JSON 报告。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Record,
  class_table: ClassTable,
  with_json: bool,
  counter: AtomicU32,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let label_with_name = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| v != "id")
      .unwrap_or(true);
    let with_json = uri.query_pairs().any(|(k, _)| k == "json");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: Draw::default(),
      record: Record { label_with_name },
      class_table: ClassTable::default(),
      with_json,
      counter: AtomicU32::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn with_class_table(mut self, class_table: ClassTable) -> Self {
    self.class_table = class_table;
    self
  }
}

impl Render<RgbImage, DetectionSet> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &DetectionSet) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.directory)?;

    let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let stem = format!("survey-{stamp}-{sequence:04}");

    let annotated = self.draw.annotate(frame, result);
    annotated.save(self.directory.join(format!("{stem}.png")))?;

    // 坐标清单与报告放在图像旁边，后缀 _data
    let data_base = self.directory.join(format!("{stem}_data"));
    self.record.record(result, &self.class_table, &data_base)?;
    if self.with_json {
      self.record.record_json(result, &self.class_table, &data_base)?;
    }

    info!(
      "记录巡查结果到 {}: {} 个检测",
      self.directory.join(stem).display(),
      result.len()
    );

    Ok(())
  }
}
