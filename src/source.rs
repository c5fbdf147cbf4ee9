// 该文件是 Thermal Dataset 项目的一部分。
// src/source.rs - 标注记录来源
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

use thiserror::Error;

use crate::record::AnnotationRecord;

mod http;
pub use self::http::{HttpAnnotationSource, SourceConfig};

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("HTTP 请求失败 {url}: {reason}")]
  Transport { url: String, reason: surf::Error },
  #[error("HTTP 状态异常 {url}: {status}")]
  Status { url: String, status: u16 },
  #[error("响应解析失败 {url}: {source}")]
  Decode {
    url: String,
    source: serde_json::Error,
  },
  #[error("无效的地址 {url}: {source}")]
  InvalidUrl {
    url: String,
    source: url::ParseError,
  },
  #[error("客户端配置错误: {0}")]
  Config(String),
}

/// 标注修正记录与对应图像的提供方
pub trait AnnotationSource {
  /// 拉取当前全部修正记录
  fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError>;

  /// 按记录中的相对地址下载图像原始字节
  fn fetch_image(&self, relative_url: &str) -> Result<Vec<u8>, SourceError>;
}

impl<S: AnnotationSource + ?Sized> AnnotationSource for &S {
  fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError> {
    (**self).list_records()
  }

  fn fetch_image(&self, relative_url: &str) -> Result<Vec<u8>, SourceError> {
    (**self).fetch_image(relative_url)
  }
}

/// 拼接图像基地址与相对路径，保证中间只有一个 `/`
pub fn join_image_url(base: &str, relative: &str) -> String {
  format!(
    "{}/{}",
    base.trim_end_matches('/'),
    relative.trim_start_matches('/')
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn image_url_joins_with_single_slash() {
    let expected = "http://localhost:8080/api/inspections/images/a.jpg";
    for (base, relative) in [
      ("http://localhost:8080", "/api/inspections/images/a.jpg"),
      ("http://localhost:8080/", "/api/inspections/images/a.jpg"),
      ("http://localhost:8080/", "api/inspections/images/a.jpg"),
    ] {
      assert_eq!(join_image_url(base, relative), expected);
    }
  }

  #[test]
  fn image_url_keeps_base_path_prefix() {
    assert_eq!(
      join_image_url("http://backend/v1/", "/images/b.jpg"),
      "http://backend/v1/images/b.jpg"
    );
  }
}
