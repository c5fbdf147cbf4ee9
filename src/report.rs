// 该文件是 Thermal Dataset 项目的一部分。
// src/report.rs - 检测结果元数据报告
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
  collections::BTreeMap,
  fmt,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
  class::{AnomalyClass, ClassError, WithLabel},
  inference::{Detector, Prediction},
};

pub const REPORT_TITLE: &str = "Thermal Anomaly Detection - Metadata Report";
pub const MODEL_NAME: &str = "YOLOv8 thermal anomaly model";

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox {
  pub top_left: Point,
  pub bottom_right: Point,
  pub center: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimensions {
  pub width_px: f64,
  pub height_px: f64,
  pub area_px: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionMetadata {
  /// 从 1 开始的序号
  pub error_number: usize,
  pub class_id: u32,
  pub class_name: &'static str,
  pub severity: &'static str,
  pub confidence_score: f64,
  pub confidence_percentage: f64,
  pub bounding_box: BoundingBox,
  pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
  pub image_name: String,
  pub image_path: String,
  pub analysis_timestamp: String,
  pub confidence_threshold: f64,
  pub total_detections: usize,
  pub detections: Vec<DetectionMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
  pub title: &'static str,
  pub generated_at: String,
  pub total_images_analyzed: usize,
  pub total_detections: usize,
  pub failed_images: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
  pub name: &'static str,
  pub confidence_threshold: f64,
  pub class_mappings: BTreeMap<u32, &'static str>,
  pub severity_mappings: BTreeMap<u32, &'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedImage {
  pub image_name: String,
  pub reason: String,
}

/// 一批图像的汇总报告
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
  pub report_metadata: ReportMetadata,
  pub model_info: ModelInfo,
  pub results: Vec<ImageReport>,
  pub failures: Vec<FailedImage>,
}

fn round_to(value: f64, places: i32) -> f64 {
  let factor = 10f64.powi(places);
  (value * factor).round() / factor
}

fn point(x: f64, y: f64) -> Point {
  Point {
    x: round_to(x, 2),
    y: round_to(y, 2),
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default()
}

impl DetectionMetadata {
  pub fn from_prediction(error_number: usize, prediction: &Prediction) -> Result<Self, ClassError> {
    let class = AnomalyClass::from_label_id(prediction.class_id)?;
    let bbox = &prediction.bbox;
    let (cx, cy) = bbox.center();

    Ok(DetectionMetadata {
      error_number,
      class_id: prediction.class_id,
      class_name: class.to_label_str(),
      severity: class.severity().as_str(),
      confidence_score: round_to(prediction.confidence, 4),
      confidence_percentage: round_to(prediction.confidence * 100.0, 2),
      bounding_box: BoundingBox {
        top_left: point(bbox.x1, bbox.y1),
        bottom_right: point(bbox.x2, bbox.y2),
        center: point(cx, cy),
      },
      dimensions: Dimensions {
        width_px: round_to(bbox.width(), 2),
        height_px: round_to(bbox.height(), 2),
        area_px: round_to(bbox.area(), 2),
      },
    })
  }
}

impl ImageReport {
  /// 根据推理结果生成单张图像的报告，遇到未知类别时直接返回错误
  pub fn from_predictions(
    image_path: &Path,
    confidence_threshold: f64,
    predictions: &[Prediction],
    analysed_at: DateTime<Utc>,
  ) -> Result<Self, ClassError> {
    let detections = predictions
      .iter()
      .enumerate()
      .map(|(idx, p)| DetectionMetadata::from_prediction(idx + 1, p))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(ImageReport {
      image_name: file_name(image_path),
      image_path: image_path.display().to_string(),
      analysis_timestamp: analysed_at.to_rfc3339(),
      confidence_threshold,
      total_detections: detections.len(),
      detections,
    })
  }
}

impl ModelInfo {
  pub fn new(confidence_threshold: f64) -> Self {
    ModelInfo {
      name: MODEL_NAME,
      confidence_threshold,
      class_mappings: AnomalyClass::ALL
        .iter()
        .map(|class| (class.to_label_id(), class.to_label_str()))
        .collect(),
      severity_mappings: AnomalyClass::ALL
        .iter()
        .map(|class| (class.to_label_id(), class.severity().as_str()))
        .collect(),
    }
  }
}

impl DetectionReport {
  /// 逐张调用检测器并汇总结果
  ///
  /// 单张图像请求失败或含有未知类别时记入 `failures`，不影响其余图像。
  pub fn generate<D: Detector>(
    detector: &D,
    images: &[PathBuf],
    confidence_threshold: f64,
    generated_at: DateTime<Utc>,
  ) -> Self {
    let mut results = Vec::new();
    let mut failures = Vec::new();

    for (idx, path) in images.iter().enumerate() {
      info!("[{}/{}] 处理图像: {}", idx + 1, images.len(), path.display());
      let outcome = detector
        .detect(path, confidence_threshold)
        .map_err(|e| e.to_string())
        .and_then(|response| {
          ImageReport::from_predictions(
            path,
            confidence_threshold,
            &response.predictions,
            generated_at,
          )
          .map_err(|e| e.to_string())
        });

      match outcome {
        Ok(report) => {
          info!("发现 {} 个异常", report.total_detections);
          results.push(report);
        }
        Err(reason) => {
          warn!("图像 {} 处理失败: {}", path.display(), reason);
          failures.push(FailedImage {
            image_name: file_name(path),
            reason,
          });
        }
      }
    }

    DetectionReport {
      report_metadata: ReportMetadata {
        title: REPORT_TITLE,
        generated_at: generated_at.to_rfc3339(),
        total_images_analyzed: results.len(),
        total_detections: results.iter().map(|r| r.total_detections).sum(),
        failed_images: failures.len(),
      },
      model_info: ModelInfo::new(confidence_threshold),
      results,
      failures,
    }
  }
}

/// 目录下的 jpg/jpeg 图像，按文件名排序，最多取 `limit` 张
pub fn find_images(dir: &Path, limit: usize) -> std::io::Result<Vec<PathBuf>> {
  let mut images = std::fs::read_dir(dir)?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<Result<Vec<_>, _>>()?
    .into_iter()
    .filter(|path| path.is_file())
    .filter(|path| {
      path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
    })
    .collect::<Vec<_>>();
  images.sort();
  images.truncate(limit);
  Ok(images)
}

impl fmt::Display for DetectionMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let bbox = &self.bounding_box;
    let dims = &self.dimensions;
    writeln!(f, "  [{}] Error #{}", self.severity, self.error_number)?;
    writeln!(f, "  Class: {} (ID: {})", self.class_name, self.class_id)?;
    writeln!(
      f,
      "  Confidence: {}% ({})",
      self.confidence_percentage, self.confidence_score
    )?;
    writeln!(f, "  Top-left: ({}, {})", bbox.top_left.x, bbox.top_left.y)?;
    writeln!(
      f,
      "  Bottom-right: ({}, {})",
      bbox.bottom_right.x, bbox.bottom_right.y
    )?;
    writeln!(f, "  Center: ({}, {})", bbox.center.x, bbox.center.y)?;
    writeln!(
      f,
      "  Size: {} x {} px, area {} px",
      dims.width_px, dims.height_px, dims.area_px
    )
  }
}

impl fmt::Display for ImageReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Path: {}", self.image_path)?;
    writeln!(f, "Analysis time: {}", self.analysis_timestamp)?;
    writeln!(f, "Total detections: {}", self.total_detections)?;
    writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
    if self.detections.is_empty() {
      return writeln!(f, "  No anomalies detected");
    }
    for detection in &self.detections {
      writeln!(f)?;
      write!(f, "{}", detection)?;
    }
    Ok(())
  }
}

impl fmt::Display for DetectionReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);
    let meta = &self.report_metadata;

    writeln!(f, "{}", rule)?;
    writeln!(f, "{}", meta.title)?;
    writeln!(f, "{}", rule)?;
    writeln!(f, "Generated: {}", meta.generated_at)?;
    writeln!(f, "Model: {}", self.model_info.name)?;
    writeln!(
      f,
      "Confidence threshold: {}",
      self.model_info.confidence_threshold
    )?;
    writeln!(f, "Images analyzed: {}", meta.total_images_analyzed)?;
    writeln!(f, "Total detections: {}", meta.total_detections)?;
    writeln!(f, "Failed images: {}", meta.failed_images)?;

    for (idx, image) in self.results.iter().enumerate() {
      writeln!(f)?;
      writeln!(f, "{}", rule)?;
      writeln!(f, "IMAGE {}: {}", idx + 1, image.image_name)?;
      writeln!(f, "{}", rule)?;
      write!(f, "{}", image)?;
    }

    if !self.failures.is_empty() {
      writeln!(f)?;
      writeln!(f, "Failed images:")?;
      for failure in &self.failures {
        writeln!(f, "  - {}: {}", failure.image_name, failure.reason)?;
      }
    }

    writeln!(f)?;
    writeln!(f, "{}", rule)?;
    writeln!(f, "END OF REPORT")?;
    write!(f, "{}", rule)
  }
}
