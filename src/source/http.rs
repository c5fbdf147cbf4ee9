// 该文件是 Thermal Dataset 项目的一部分。
// src/source/http.rs - 基于 HTTP 的标注记录来源
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

use std::time::Duration;

use tracing::debug;
use url::Url;

use super::{AnnotationSource, SourceError, join_image_url};
use crate::record::AnnotationRecord;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SourceConfig {
  /// 修正记录列表接口
  pub records_url: Url,
  /// 图像相对地址的基地址
  pub image_base_url: Url,
  /// 单个请求的超时时间
  pub timeout: Duration,
}

impl SourceConfig {
  pub fn new(records_url: Url, image_base_url: Url) -> Self {
    SourceConfig {
      records_url,
      image_base_url,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

pub struct HttpAnnotationSource {
  client: surf::Client,
  records_url: Url,
  image_base_url: Url,
}

impl HttpAnnotationSource {
  pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
    let client = surf::Client::try_from(surf::Config::new().set_timeout(Some(config.timeout)))
      .map_err(|e| SourceError::Config(e.to_string()))?;

    Ok(HttpAnnotationSource {
      client,
      records_url: config.records_url,
      image_base_url: config.image_base_url,
    })
  }

  fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
    async_std::task::block_on(async {
      debug!("GET {}", url);
      let mut response = self
        .client
        .get(url)
        .await
        .map_err(|reason| SourceError::Transport {
          url: url.to_string(),
          reason,
        })?;

      let status = response.status();
      if !status.is_success() {
        return Err(SourceError::Status {
          url: url.to_string(),
          status: status as u16,
        });
      }

      response
        .body_bytes()
        .await
        .map_err(|reason| SourceError::Transport {
          url: url.to_string(),
          reason,
        })
    })
  }
}

impl AnnotationSource for HttpAnnotationSource {
  fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError> {
    let url = self.records_url.as_str();
    let body = self.get_bytes(url)?;
    serde_json::from_slice(&body).map_err(|source| SourceError::Decode {
      url: url.to_string(),
      source,
    })
  }

  fn fetch_image(&self, relative_url: &str) -> Result<Vec<u8>, SourceError> {
    let joined = join_image_url(self.image_base_url.as_str(), relative_url);
    let url = Url::parse(&joined).map_err(|source| SourceError::InvalidUrl {
      url: joined.clone(),
      source,
    })?;
    self.get_bytes(url.as_str())
  }
}
