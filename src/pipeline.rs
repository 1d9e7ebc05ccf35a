// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/pipeline.rs - 切片检测融合管线
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

use std::sync::mpsc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, FailurePolicy, FusionConfig};
use crate::input::TileSource;
use crate::merge::{self, DetectionSet, MergeError};
use crate::model::{Detection, Detector, RawDetection};
use crate::tile;

/// 单幅图像允许的切片数量上限，超出视为资源耗尽
pub const MAX_TILES: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置无效: {0}")]
  Config(#[from] ConfigError),
  #[error("图像过大: 预计 {count} 个切片, 超过上限 {max}")]
  TooManyTiles { count: usize, max: usize },
  #[error("切片 {tile_index} 检测失败: {source}")]
  Detector {
    tile_index: usize,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("切片 {tile_index} 结果缺失")]
  MissingTile { tile_index: usize },
  #[error(transparent)]
  Merge(#[from] MergeError),
}

/// 对一幅图像执行完整的切片、检测、重映射与融合。
///
/// 切片间互相独立，检测器调用分摊到不超过 `config.workers` 个工作线程；
/// 结果落入按切片编号索引的槽位，全部槽位就绪后才开始融合，
/// 因此要么返回完整一致的检测集合，要么返回分类明确的错误，绝不吐出半成品。
pub fn run_survey<S, D>(
  source: &S,
  detector: &D,
  config: &FusionConfig,
) -> Result<DetectionSet, PipelineError>
where
  S: TileSource + Sync,
  D: Detector<Region = S::Region> + Sync,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  config.validate()?;

  let estimate = tile::tile_count_upper_bound(source.width(), source.height(), config);
  if estimate > MAX_TILES {
    return Err(PipelineError::TooManyTiles {
      count: estimate,
      max: MAX_TILES,
    });
  }

  let tiles = tile::schedule(source.width(), source.height(), config);
  info!(
    "图像 {}x{}, 共 {} 个切片, 步长 {}",
    source.width(),
    source.height(),
    tiles.len(),
    config.stride()
  );

  let slots = detect_tiles(source, detector, config, &tiles);

  let mut detections: Vec<Detection> = Vec::new();
  for (index, (tile, slot)) in tiles.iter().zip(slots).enumerate() {
    let raw = match slot {
      None => return Err(PipelineError::MissingTile { tile_index: index }),
      Some(Err(err)) => match config.failure_policy {
        FailurePolicy::FailFast => {
          return Err(PipelineError::Detector {
            tile_index: index,
            source: Box::new(err),
          });
        }
        FailurePolicy::SkipAndContinue => {
          warn!("切片 {} 检测失败, 按策略跳过: {}", index, err);
          Vec::new()
        }
      },
      Some(Ok(raw)) => raw,
    };

    for detection in raw {
      match merge::remap(tile, detection) {
        Ok(mapped) => detections.push(mapped),
        Err(bad) => warn!("切片 {} 返回非法检测, 丢弃: {}", index, bad),
      }
    }
  }

  let merged = merge::merge(detections, config.iou_threshold)?;
  info!("融合完成: {} 个类别, {} 个检测", merged.class_count(), merged.len());
  Ok(merged)
}

type TileSlots<E> = Vec<Option<Result<Vec<RawDetection>, E>>>;

/// 逐切片调用检测器，结果写入按切片编号索引的槽位。
/// 检测器只读共享，除各自槽位外无共享可变状态，无需加锁。
fn detect_tiles<S, D>(
  source: &S,
  detector: &D,
  config: &FusionConfig,
  tiles: &[tile::Tile],
) -> TileSlots<D::Error>
where
  S: TileSource + Sync,
  D: Detector<Region = S::Region> + Sync,
  D::Error: Send,
{
  let workers = config.workers.min(tiles.len().max(1));
  if workers <= 1 {
    return tiles
      .iter()
      .map(|tile| Some(detector.detect(&source.extract(tile))))
      .collect();
  }

  let (tx, rx) = mpsc::channel();
  std::thread::scope(|scope| {
    for worker in 0..workers {
      let tx = tx.clone();
      scope.spawn(move || {
        // 切片按编号条带分配给各工作线程
        let mut index = worker;
        while index < tiles.len() {
          let region = source.extract(&tiles[index]);
          let result = detector.detect(&region);
          if tx.send((index, result)).is_err() {
            break;
          }
          index += workers;
        }
      });
    }
    drop(tx);

    let mut slots: TileSlots<D::Error> = (0..tiles.len()).map(|_| None).collect();
    for (index, result) in rx {
      slots[index] = Some(result);
    }
    slots
  })
}
