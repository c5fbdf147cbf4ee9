// 该文件是 Thermal Dataset 项目的一部分。
// src/bin/sync_dataset.rs - 同步修正标注并触发重新训练
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
  process::Command,
  sync::mpsc,
  time::Duration,
};

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use thermal_dataset::{
  AnnotationSource, DatasetLayout, HttpAnnotationSource, SourceConfig, Synchronizer,
  trigger::{DEFAULT_RETRAIN_THRESHOLD, RetrainTrigger},
};

/// 标注同步参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 修正记录列表接口
  #[arg(
    long,
    value_name = "URL",
    default_value = "http://localhost:8080/api/inspections/bounding-box-changes"
  )]
  pub records_url: Url,
  /// 图像相对地址的基地址
  #[arg(long, value_name = "URL", default_value = "http://localhost:8080")]
  pub image_base_url: Url,
  /// 数据集根目录，图像和标签写入 <DIR>/train 下
  #[arg(long, value_name = "DIR", default_value = "dataset")]
  pub dataset_dir: PathBuf,
  /// 单个 HTTP 请求的超时秒数
  #[arg(long, default_value = "30", value_name = "SECONDS")]
  pub timeout_secs: u64,
  /// 持续轮询，记录数增长达到阈值时同步
  #[arg(long)]
  pub watch: bool,
  /// 轮询间隔秒数
  #[arg(long, default_value = "60", value_name = "SECONDS")]
  pub interval_secs: u64,
  /// 触发同步所需的新增记录数
  #[arg(long, default_value_t = DEFAULT_RETRAIN_THRESHOLD, value_name = "COUNT")]
  pub threshold: usize,
  /// 同步成功后执行的重新训练命令
  #[arg(long, value_name = "PROGRAM")]
  pub retrain_command: Option<PathBuf>,
}

fn run_retrain(program: &Path) -> Result<()> {
  info!("执行重新训练命令: {}", program.display());
  let status = Command::new(program).status()?;
  if !status.success() {
    bail!("重新训练命令失败: {}", status);
  }
  info!("重新训练完成");
  Ok(())
}

fn watch<S: AnnotationSource>(sync: &Synchronizer<S>, args: &Args) -> Result<()> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
  })?;

  let interval = Duration::from_secs(args.interval_secs);
  let mut trigger = RetrainTrigger::new(args.threshold);
  info!(
    "开始轮询, 间隔 {:?}, 阈值 {} 条",
    interval,
    trigger.threshold()
  );

  loop {
    match sync.sync_when_due(&mut trigger) {
      Ok(Some(report)) => {
        info!(
          "本次同步处理 {} 条记录, 新基线 {}",
          report.processed(),
          trigger.baseline()
        );
        if let Some(program) = &args.retrain_command
          && let Err(e) = run_retrain(program)
        {
          error!("{}", e);
        }
      }
      Ok(None) => {}
      Err(e) => warn!("同步失败: {}", e),
    }

    if rx.recv_timeout(interval).is_ok() {
      warn!("中断信号接收，退出轮询");
      break;
    }
  }

  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("记录接口: {}", args.records_url);
  info!("图像基地址: {}", args.image_base_url);
  info!("数据集目录: {}", args.dataset_dir.display());

  let config = SourceConfig::new(args.records_url.clone(), args.image_base_url.clone())
    .timeout(Duration::from_secs(args.timeout_secs));
  let source = HttpAnnotationSource::new(config)?;
  let sync = Synchronizer::new(source, DatasetLayout::new(&args.dataset_dir))?;

  if args.watch {
    return watch(&sync, &args);
  }

  let report = sync.sync()?;
  for skipped in &report.skipped {
    info!("跳过记录 {}: {}", skipped.id, skipped.reason);
  }
  println!("{}", report.processed());

  if report.processed() > 0
    && let Some(program) = &args.retrain_command
  {
    run_retrain(program)?;
  }

  Ok(())
}
