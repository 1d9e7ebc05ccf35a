// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use xuntian::config::FailurePolicy;

/// Xuntian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像来源
  /// 支持格式: image:///path/to/ortho.png
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 外部检测器命令
  /// 支持格式: exec:///path/to/detector
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,

  /// 输出目标
  /// 支持格式:
  /// - 图片: image:///path/to/annotated.png
  /// - 目录: folder:///path/to/records?json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 类别表文件路径，每行一个类别名称
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 标签字体文件路径，不提供则只画边框
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 方形切片的像素边长
  #[arg(long, default_value = "1200", value_name = "PIXELS")]
  pub tile_size: u32,

  /// 相邻切片重叠比例 [0.0 - 1.0)
  #[arg(long, default_value = "0.165", value_name = "FRACTION")]
  pub overlap: f32,

  /// 同类检测去重的 NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub iou_threshold: f32,

  /// 边缘碎片切片的最小边长比例
  #[arg(long, default_value = "0.25", value_name = "FRACTION")]
  pub min_tile_fraction: f32,

  /// 单个切片检测失败时的处理策略
  #[arg(long, value_enum, default_value = "skip-and-continue")]
  pub policy: FailurePolicy,

  /// 工作线程数（0 表示按可用 CPU 自动选择）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub workers: usize,
}
