// 该文件是 Thermal Dataset 项目的一部分。
// src/dataset.rs - 训练数据集目录结构
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

const TRAIN_SPLIT: &str = "train";
const IMAGES_DIR: &str = "images";
const LABELS_DIR: &str = "labels";
const LABEL_EXTENSION: &str = "txt";

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("创建目录失败 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无效的图像文件名: {0:?}")]
  InvalidFilename(String),
}

/// `<root>/train/images` 与 `<root>/train/labels` 的目录布局
#[derive(Debug, Clone)]
pub struct DatasetLayout {
  root: PathBuf,
}

/// 同名的一对图像与标签文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
  pub image: PathBuf,
  pub label: PathBuf,
}

impl DatasetLayout {
  pub fn new(dataset_dir: impl AsRef<Path>) -> Self {
    DatasetLayout {
      root: dataset_dir.as_ref().join(TRAIN_SPLIT),
    }
  }

  pub fn images_dir(&self) -> PathBuf {
    self.root.join(IMAGES_DIR)
  }

  pub fn labels_dir(&self) -> PathBuf {
    self.root.join(LABELS_DIR)
  }

  /// 创建图像与标签目录，目录已存在时不做任何事
  pub fn provision(&self) -> Result<(), DatasetError> {
    for dir in [self.images_dir(), self.labels_dir()] {
      std::fs::create_dir_all(&dir).map_err(|source| DatasetError::CreateDir {
        path: dir.clone(),
        source,
      })?;
    }
    info!("数据集目录已就绪: {}", self.root.display());
    Ok(())
  }

  /// 根据后端给出的文件名计算图像和标签的落盘路径
  ///
  /// 只接受单个路径分量，带目录或 `..` 的名字会被拒绝。
  pub fn entry(&self, filename: &str) -> Result<DatasetEntry, DatasetError> {
    let name = Path::new(filename);
    let is_plain = matches!(name.file_name(), Some(f) if f == name.as_os_str());
    if filename.is_empty() || !is_plain {
      return Err(DatasetError::InvalidFilename(filename.to_string()));
    }

    Ok(DatasetEntry {
      image: self.images_dir().join(name),
      label: self
        .labels_dir()
        .join(name.with_extension(LABEL_EXTENSION)),
    })
  }
}
