// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/model.rs - 检测器边界
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

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::bbox::PixelBox;

/// 外部检测器边界：对每个切片区域调用一次，返回切片局部坐标的原始检测。
/// 检测器实例构造一次，在并发切片调用间只读共享，由持有方负责销毁。
pub trait Detector {
  type Region;
  type Error;

  fn detect(&self, region: &Self::Region) -> Result<Vec<RawDetection>, Self::Error>;
}

/// 切片局部坐标系下的原始检测
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
  /// 切片局部像素坐标的边界框
  pub bbox: PixelBox,
  /// 类别编号，经 ClassTable 解析为名称
  pub class_id: u32,
  /// 置信度，[0, 1]
  pub score: f32,
}

/// 全图坐标系下的检测
#[derive(Debug, Clone, Copy)]
pub struct Detection {
  pub bbox: PixelBox,
  pub class_id: u32,
  pub score: f32,
}

/// 类别编号到名称的映射表，与检测器一同由调用方提供，
/// 未知编号退化为其数字字符串而不是报错。
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
  names: Vec<String>,
}

impl ClassTable {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  /// 从文本文件读取类别表，每行一个名称，空行忽略
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
    let file = std::fs::File::open(path)?;
    let mut names = Vec::new();
    for line in BufReader::new(file).lines() {
      let line = line?;
      let name = line.trim();
      if !name.is_empty() {
        names.push(name.to_string());
      }
    }
    Ok(Self { names })
  }

  pub fn name_of(&self, class_id: u32) -> String {
    match self.names.get(class_id as usize) {
      Some(name) => name.clone(),
      None => class_id.to_string(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl FromIterator<String> for ClassTable {
  fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

#[cfg(feature = "command_detector")]
mod command;
#[cfg(feature = "command_detector")]
pub use self::command::{CommandDetector, CommandDetectorError};
