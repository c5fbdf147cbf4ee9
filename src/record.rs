// 该文件是 Thermal Dataset 项目的一部分。
// src/record.rs - 后端标注修正记录
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

use serde::{Deserialize, Serialize};

use crate::label::AnnotatedBox;

/// 后端 `bounding-box-changes` 接口返回的单条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
  pub id: i64,
  #[serde(rename = "maintenanceImagePath", default)]
  pub image_filename: Option<String>,
  #[serde(rename = "maintenanceImageUrl", default)]
  pub image_url: Option<String>,
  /// 序列化后的标注框列表（JSON 字符串）
  #[serde(rename = "editedOrManuallyAddedBoxes", default)]
  pub corrections: Option<String>,
}

impl AnnotationRecord {
  /// 解析用户修正的标注框
  ///
  /// 以下情况都视为“没有修正”，返回 `Ok(None)`:
  /// 字段缺失、空白字符串、`[]`（含内部空白）、JSON `null`。
  /// 其余无法解析为标注框列表的内容返回错误。
  pub fn corrections(&self) -> Result<Option<Vec<AnnotatedBox>>, serde_json::Error> {
    let Some(raw) = self.corrections.as_deref() else {
      return Ok(None);
    };

    let raw = raw.trim();
    if raw.is_empty() || raw == "[]" {
      return Ok(None);
    }

    let boxes: Option<Vec<AnnotatedBox>> = serde_json::from_str(raw)?;
    Ok(boxes.filter(|boxes| !boxes.is_empty()))
  }
}
