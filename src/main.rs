// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use xuntian::config::FusionConfig;
use xuntian::input::{ImageFileInput, TileSource};
use xuntian::model::{ClassTable, CommandDetector};
use xuntian::output::draw::Draw;
use xuntian::output::{OutputWrapper, Render};
use xuntian::{pipeline, FromUrl};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入图像: {}", args.input);
  info!("外部检测器: {}", args.detector);
  info!("输出目标: {}", args.output);
  info!(
    "切片 {} 像素, 重叠 {}, IoU 阈值 {}",
    args.tile_size, args.overlap, args.iou_threshold
  );

  let workers = if args.workers == 0 {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
  } else {
    args.workers
  };

  let config = FusionConfig {
    tile_size: args.tile_size,
    overlap: args.overlap,
    iou_threshold: args.iou_threshold,
    min_tile_fraction: args.min_tile_fraction,
    failure_policy: args.policy,
    workers,
  };

  let class_table = match &args.labels {
    Some(path) => ClassTable::from_file(path)?,
    None => ClassTable::default(),
  };
  if !class_table.is_empty() {
    info!("类别表: {} 个类别", class_table.len());
  }

  let source = ImageFileInput::from_url(&args.input)?;
  info!("输入图像尺寸: {}x{}", source.width(), source.height());

  let detector = CommandDetector::from_url(&args.detector)?;

  info!("开始切片检测与融合...");
  let now = std::time::Instant::now();
  let result = pipeline::run_survey(&source, &detector, &config)?;
  info!("融合完成，耗时: {:.2?}", now.elapsed());

  for (name, boxes) in result.group_by_name(&class_table) {
    info!("  - {}: {} 个", name, boxes.len());
  }

  let mut draw = Draw::new(class_table.clone());
  if let Some(font) = &args.font {
    draw = draw.with_font_file(font)?;
  }

  let output = OutputWrapper::from_url(&args.output)?
    .with_class_table(class_table)
    .with_draw(draw);
  output.render_result(source.image(), &result)?;

  info!("处理完成: 共 {} 个检测", result.len());

  Ok(())
}
