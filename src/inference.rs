// 该文件是 Thermal Dataset 项目的一部分。
// src/inference.rs - 推理接口客户端
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
  path::{Path, PathBuf},
  time::Duration,
};

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use surf::http::Mime;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::label::PixelBox;

pub const DEFAULT_INFERENCE_URL: &str = "http://localhost:5000/inference";

const BOUNDARY: &str = "thermal-dataset-7d41b2c9";

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("图像读取失败 {path}: {source}")]
  ReadImage {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("推理请求失败 {url}: {reason}")]
  Transport { url: String, reason: surf::Error },
  #[error("推理接口状态异常 {url}: {status}")]
  Status { url: String, status: u16 },
  #[error("推理结果解析失败 {url}: {source}")]
  Decode {
    url: String,
    source: serde_json::Error,
  },
  #[error("客户端配置错误: {0}")]
  Config(String),
}

/// 推理接口的返回内容 `{"predictions": [...]}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InferenceResponse {
  #[serde(default)]
  pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Prediction {
  #[serde(rename = "class")]
  pub class_id: u32,
  pub confidence: f64,
  #[serde(rename = "box")]
  pub bbox: PixelBox,
}

/// 对单张图像给出检测结果
pub trait Detector {
  fn detect(
    &self,
    image_path: &Path,
    confidence_threshold: f64,
  ) -> Result<InferenceResponse, InferenceError>;
}

/// 以 multipart 表单上传图像的推理接口客户端
pub struct InferenceClient {
  client: surf::Client,
  endpoint: Url,
}

impl InferenceClient {
  pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, InferenceError> {
    let client = surf::Client::try_from(surf::Config::new().set_timeout(Some(timeout)))
      .map_err(|e| InferenceError::Config(e.to_string()))?;
    Ok(InferenceClient { client, endpoint })
  }

  fn request_url(&self, confidence_threshold: f64) -> Url {
    let mut url = self.endpoint.clone();
    url
      .query_pairs_mut()
      .append_pair("conf_threshold", &confidence_threshold.to_string());
    url
  }
}

/// 只有一个 `file` 字段的 multipart/form-data 请求体
fn multipart_body(filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
  let filename = filename.replace(['"', '\r', '\n'], "_");
  let mut body = Vec::with_capacity(bytes.len() + 256);
  body.extend_from_slice(
    format!(
      "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
      BOUNDARY, filename, content_type
    )
    .as_bytes(),
  );
  body.extend_from_slice(bytes);
  body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
  body
}

impl Detector for InferenceClient {
  fn detect(
    &self,
    image_path: &Path,
    confidence_threshold: f64,
  ) -> Result<InferenceResponse, InferenceError> {
    let bytes = std::fs::read(image_path).map_err(|source| InferenceError::ReadImage {
      path: image_path.to_path_buf(),
      source,
    })?;
    let filename = image_path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let file_type = ImageFormat::from_path(image_path)
      .map(|format| format.to_mime_type())
      .unwrap_or("application/octet-stream");

    let url = self.request_url(confidence_threshold);
    let mime: Mime = format!("multipart/form-data; boundary={}", BOUNDARY)
      .parse::<Mime>()
      .map_err(|e| InferenceError::Config(e.to_string()))?;
    let body = multipart_body(&filename, file_type, &bytes);

    async_std::task::block_on(async {
      debug!("POST {} ({} 字节)", url, bytes.len());
      let mut response = self
        .client
        .post(url.as_str())
        .body(surf::Body::from_bytes(body))
        .content_type(mime)
        .await
        .map_err(|reason| InferenceError::Transport {
          url: url.to_string(),
          reason,
        })?;

      let status = response.status();
      if !status.is_success() {
        return Err(InferenceError::Status {
          url: url.to_string(),
          status: status as u16,
        });
      }

      let body = response
        .body_bytes()
        .await
        .map_err(|reason| InferenceError::Transport {
          url: url.to_string(),
          reason,
        })?;
      serde_json::from_slice(&body).map_err(|source| InferenceError::Decode {
        url: url.to_string(),
        source,
      })
    })
  }
}
