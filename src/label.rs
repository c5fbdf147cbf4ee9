// 该文件是 Thermal Dataset 项目的一部分。
// src/label.rs - 像素框到 YOLO 标签的转换
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

use std::{
  fmt,
  path::{Path, PathBuf},
};

use image::ImageReader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("图像读取失败 {path}: {source}")]
  ImageRead {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("图像解码失败 {path}: {source}")]
  ImageDecode {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("标签写入失败 {path}: {source}")]
  LabelWrite {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// 像素坐标下的矩形框 [x1, y1, x2, y2]，左上角与右下角
///
/// 坐标不做任何校验，越界、负数或反向的框都会原样参与归一化。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct PixelBox {
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
}

impl From<[f64; 4]> for PixelBox {
  fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
    PixelBox { x1, y1, x2, y2 }
  }
}

impl From<PixelBox> for [f64; 4] {
  fn from(bbox: PixelBox) -> Self {
    [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
  }
}

impl PixelBox {
  pub fn width(&self) -> f64 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f64 {
    self.y2 - self.y1
  }

  pub fn center(&self) -> (f64, f64) {
    ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
  }

  pub fn area(&self) -> f64 {
    self.width() * self.height()
  }
}

/// 用户修改或手动添加的标注框
///
/// 后端返回的条目里还有 `type`、`comment`、`originalBox` 等字段，这里只关心类别和坐标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBox {
  #[serde(rename = "class")]
  pub class_id: u32,
  #[serde(rename = "box")]
  pub bbox: PixelBox,
}

impl AnnotatedBox {
  pub fn new(class_id: u32, bbox: impl Into<PixelBox>) -> Self {
    AnnotatedBox {
      class_id,
      bbox: bbox.into(),
    }
  }

  /// 按图像宽高归一化为中心点格式
  pub fn normalize(&self, width: u32, height: u32) -> NormalizedLabel {
    let (w, h) = (width as f64, height as f64);
    let (cx, cy) = self.bbox.center();
    NormalizedLabel {
      class_id: self.class_id,
      x_center: cx / w,
      y_center: cy / h,
      width: self.bbox.width() / w,
      height: self.bbox.height() / h,
    }
  }
}

/// YOLO 标签中的一行
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedLabel {
  pub class_id: u32,
  pub x_center: f64,
  pub y_center: f64,
  pub width: f64,
  pub height: f64,
}

impl NormalizedLabel {
  /// 还原为像素坐标
  pub fn denormalize(&self, width: u32, height: u32) -> PixelBox {
    let (w, h) = (width as f64, height as f64);
    let (cx, cy) = (self.x_center * w, self.y_center * h);
    let (bw, bh) = (self.width * w, self.height * h);
    PixelBox {
      x1: cx - bw / 2.0,
      y1: cy - bh / 2.0,
      x2: cx + bw / 2.0,
      y2: cy + bh / 2.0,
    }
  }
}

impl fmt::Display for NormalizedLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} {:.6} {:.6} {:.6} {:.6}",
      self.class_id, self.x_center, self.y_center, self.width, self.height
    )
  }
}

/// 生成标签文件内容，行之间用换行分隔，末尾不带换行
pub fn to_label_lines(boxes: &[AnnotatedBox], width: u32, height: u32) -> String {
  boxes
    .iter()
    .map(|b| b.normalize(width, height).to_string())
    .collect::<Vec<_>>()
    .join("\n")
}

/// 完整解码内存中的图像并返回宽高，`path` 只用于错误信息
pub fn decode_dimensions(bytes: &[u8], path: &Path) -> Result<(u32, u32), LabelError> {
  let image = image::load_from_memory(bytes).map_err(|source| {
    error!("无法解码图像: {}", path.display());
    LabelError::ImageDecode {
      path: path.to_path_buf(),
      source,
    }
  })?;
  Ok((image.width(), image.height()))
}

/// 按给定尺寸写出标签文件，覆盖已有内容，返回写入的行数
pub fn write_label(
  boxes: &[AnnotatedBox],
  width: u32,
  height: u32,
  label_path: &Path,
) -> Result<usize, LabelError> {
  let content = to_label_lines(boxes, width, height);
  std::fs::write(label_path, content).map_err(|source| LabelError::LabelWrite {
    path: label_path.to_path_buf(),
    source,
  })?;
  Ok(boxes.len())
}

/// 读取已下载的图像获得真实尺寸，再把标注框写成 YOLO 标签文件
///
/// 图像无法解码时直接返回错误，不会创建标签文件。框列表为空时仍然写出一个空文件。
/// 返回写入的标签行数。
pub fn convert_to_yolo(
  boxes: &[AnnotatedBox],
  image_path: &Path,
  label_path: &Path,
) -> Result<usize, LabelError> {
  let image = ImageReader::open(image_path)
    .and_then(|reader| reader.with_guessed_format())
    .map_err(|source| {
      error!("无法读取图像: {}", image_path.display());
      LabelError::ImageRead {
        path: image_path.to_path_buf(),
        source,
      }
    })?
    .decode()
    .map_err(|source| {
      error!("无法解码图像: {}", image_path.display());
      LabelError::ImageDecode {
        path: image_path.to_path_buf(),
        source,
      }
    })?;

  let (width, height) = (image.width(), image.height());
  debug!(
    "图像 {} 尺寸 {}x{}, 标注框 {} 个",
    image_path.display(),
    width,
    height,
    boxes.len()
  );

  write_label(boxes, width, height, label_path)
}
