// 该文件是 Xuntian （巡田东风） 项目的一部分。
// src/input.rs - 图像输入
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

use crate::tile::Tile;

/// 图像来源边界：只需提供尺寸与任意矩形子区域的提取，
/// 本核心不负责读取或解码图像文件本身。
pub trait TileSource {
  type Region;

  fn width(&self) -> u32;
  fn height(&self) -> u32;

  /// 提取一个切片窗口的像素区域
  fn extract(&self, tile: &Tile) -> Self::Region;
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};
