// 该文件是 Thermal Dataset 项目的一部分。
// src/bin/detection_report.rs - 生成检测结果元数据报告
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

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use thermal_dataset::{
  inference::{DEFAULT_INFERENCE_URL, InferenceClient},
  report::{DetectionReport, find_images},
};

/// 检测报告参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理接口地址
  #[arg(long, value_name = "URL", default_value = DEFAULT_INFERENCE_URL)]
  pub inference_url: Url,
  /// 待分析的图像目录，读取其中的 jpg/jpeg 文件
  #[arg(long, value_name = "DIR", default_value = "backend/uploads/maintenance")]
  pub images: PathBuf,
  /// 最多分析的图像数量
  #[arg(long, default_value = "5", value_name = "COUNT")]
  pub limit: usize,
  /// 推理时使用的置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence_threshold: f64,
  /// 单个推理请求的超时秒数
  #[arg(long, default_value = "60", value_name = "SECONDS")]
  pub timeout_secs: u64,
  /// JSON 报告输出路径
  #[arg(long, value_name = "FILE", default_value = "detection_logs_report.json")]
  pub json_output: PathBuf,
  /// 文本报告输出路径
  #[arg(long, value_name = "FILE", default_value = "detection_logs_report.txt")]
  pub text_output: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理接口: {}", args.inference_url);
  info!("图像目录: {}", args.images.display());

  let images = find_images(&args.images, args.limit)
    .with_context(|| format!("无法读取图像目录 {}", args.images.display()))?;
  if images.is_empty() {
    bail!("目录 {} 中没有 jpg/jpeg 图像", args.images.display());
  }
  if images.len() < args.limit {
    warn!("只找到 {} 张图像, 少于 {} 张", images.len(), args.limit);
  }

  let client = InferenceClient::new(
    args.inference_url.clone(),
    Duration::from_secs(args.timeout_secs),
  )?;
  let report = DetectionReport::generate(&client, &images, args.confidence_threshold, Utc::now());
  if report.results.is_empty() {
    bail!("没有图像处理成功，无法生成报告");
  }

  let json = serde_json::to_string_pretty(&report)?;
  std::fs::write(&args.json_output, json)
    .with_context(|| format!("无法写入 {}", args.json_output.display()))?;
  std::fs::write(&args.text_output, report.to_string())
    .with_context(|| format!("无法写入 {}", args.text_output.display()))?;

  let meta = &report.report_metadata;
  info!("JSON 报告已保存到: {}", args.json_output.display());
  info!("文本报告已保存到: {}", args.text_output.display());
  info!(
    "处理图像 {} 张, 检测到 {} 个异常, 失败 {} 张",
    meta.total_images_analyzed, meta.total_detections, meta.failed_images
  );
  for failure in &report.failures {
    warn!("失败图像 {}: {}", failure.image_name, failure.reason);
  }

  Ok(())
}
