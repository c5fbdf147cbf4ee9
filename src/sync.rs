// 该文件是 Thermal Dataset 项目的一部分。
// src/sync.rs - 数据集同步
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

use std::sync::{Mutex, TryLockError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  dataset::{DatasetEntry, DatasetError, DatasetLayout},
  label::{decode_dimensions, write_label},
  record::AnnotationRecord,
  source::{AnnotationSource, SourceError},
  trigger::RetrainTrigger,
};

#[derive(Error, Debug)]
pub enum SyncError {
  #[error("获取标注记录失败: {0}")]
  Source(#[from] SourceError),
  #[error("已有同步任务正在运行")]
  AlreadyRunning,
}

/// 单条记录未被处理的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  #[error("没有修正的标注框")]
  NoCorrections,
  #[error("标注框 JSON 无效: {0}")]
  MalformedCorrections(String),
  #[error("缺少图像文件名或地址")]
  MissingImage,
  #[error("图像文件名无效: {0}")]
  InvalidFilename(String),
  #[error("图像下载失败: {0}")]
  DownloadFailed(String),
  #[error("标签转换失败: {0}")]
  ConvertFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
  pub id: i64,
  pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// 成功下载并转换的记录数
  pub processed: usize,
  pub skipped: Vec<SkippedRecord>,
}

impl SyncReport {
  pub fn processed(&self) -> usize {
    self.processed
  }

  pub fn total(&self) -> usize {
    self.processed + self.skipped.len()
  }
}

pub struct Synchronizer<S> {
  source: S,
  layout: DatasetLayout,
  running: Mutex<()>,
}

impl<S: AnnotationSource> Synchronizer<S> {
  /// 创建同步器并准备数据集目录
  pub fn new(source: S, layout: DatasetLayout) -> Result<Self, DatasetError> {
    layout.provision()?;
    Ok(Synchronizer {
      source,
      layout,
      running: Mutex::new(()),
    })
  }

  pub fn layout(&self) -> &DatasetLayout {
    &self.layout
  }

  /// 按后端返回顺序逐条处理修正记录
  ///
  /// 单条记录的失败只会记录日志并跳过；获取记录列表失败时整个任务失败。
  /// 同一时刻只允许一个同步任务运行。
  pub fn sync(&self) -> Result<SyncReport, SyncError> {
    let _guard = match self.running.try_lock() {
      Ok(guard) => guard,
      Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
      Err(TryLockError::WouldBlock) => {
        warn!("同步任务正在运行，本次请求被拒绝");
        return Err(SyncError::AlreadyRunning);
      }
    };

    info!("开始同步标注数据...");
    let records = self.source.list_records()?;
    info!("获取到 {} 条修正记录", records.len());

    let mut report = SyncReport::default();
    for record in &records {
      match self.process_record(record) {
        Ok(()) => report.processed += 1,
        Err(reason) => {
          if reason == SkipReason::NoCorrections {
            debug!("记录 {} 已跳过: {}", record.id, reason);
          } else {
            warn!("记录 {} 已跳过: {}", record.id, reason);
          }
          report.skipped.push(SkippedRecord {
            id: record.id,
            reason,
          });
        }
      }
    }

    info!(
      "同步完成: 处理 {} 条, 跳过 {} 条",
      report.processed,
      report.skipped.len()
    );
    Ok(report)
  }

  /// 记录数增长达到阈值时同步一次，未达到时返回 `None`
  ///
  /// 同步成功后以本次同步实际拿到的记录数作为新的基线，失败时基线不变。
  pub fn sync_when_due(
    &self,
    trigger: &mut RetrainTrigger,
  ) -> Result<Option<SyncReport>, SyncError> {
    let current = self.source.list_records()?.len();
    if !trigger.check(current) {
      return Ok(None);
    }

    info!(
      "记录数 {} 相比基线 {} 达到阈值, 开始同步",
      current,
      trigger.baseline()
    );
    let report = self.sync()?;
    trigger.mark_synced(report.total());
    Ok(Some(report))
  }

  fn process_record(&self, record: &AnnotationRecord) -> Result<(), SkipReason> {
    let boxes = record
      .corrections()
      .map_err(|e| SkipReason::MalformedCorrections(e.to_string()))?
      .ok_or(SkipReason::NoCorrections)?;

    let (Some(filename), Some(image_url)) =
      (record.image_filename.as_deref(), record.image_url.as_deref())
    else {
      return Err(SkipReason::MissingImage);
    };

    let entry = self
      .layout
      .entry(filename)
      .map_err(|e| SkipReason::InvalidFilename(e.to_string()))?;

    let bytes = self
      .source
      .fetch_image(image_url)
      .map_err(|e| SkipReason::DownloadFailed(e.to_string()))?;

    // 先在内存中解码，失败时磁盘上已有的图像和标签保持不变
    let (width, height) = decode_dimensions(&bytes, &entry.image)
      .map_err(|e| SkipReason::ConvertFailed(e.to_string()))?;

    if let Err(e) = std::fs::write(&entry.image, &bytes) {
      discard(&entry);
      return Err(SkipReason::DownloadFailed(format!(
        "{}: {}",
        entry.image.display(),
        e
      )));
    }
    debug!(
      "图像已保存: {} ({} 字节, {}x{})",
      entry.image.display(),
      bytes.len(),
      width,
      height
    );

    if let Err(e) = write_label(&boxes, width, height, &entry.label) {
      discard(&entry);
      return Err(SkipReason::ConvertFailed(e.to_string()));
    }

    Ok(())
  }
}

/// 写入中途失败时删除这一对文件，不留下半成品或失去配对的标签
fn discard(entry: &DatasetEntry) {
  for path in [&entry.image, &entry.label] {
    if path.exists()
      && let Err(e) = std::fs::remove_file(path)
    {
      warn!("清理文件失败 {}: {}", path.display(), e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Mutex, mpsc},
  };

  use image::{DynamicImage, ImageFormat, RgbImage};
  use tempfile::tempdir;

  use crate::source::SourceError;

  #[derive(Default)]
  struct MemorySource {
    records: Vec<AnnotationRecord>,
    images: HashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
  }

  impl AnnotationSource for MemorySource {
    fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError> {
      Ok(self.records.clone())
    }

    fn fetch_image(&self, relative_url: &str) -> Result<Vec<u8>, SourceError> {
      self.fetched.lock().unwrap().push(relative_url.to_string());
      self
        .images
        .get(relative_url)
        .cloned()
        .ok_or_else(|| SourceError::Status {
          url: relative_url.to_string(),
          status: 404,
        })
    }
  }

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();
    bytes
  }

  fn record(id: i64, name: &str, corrections: Option<&str>) -> AnnotationRecord {
    AnnotationRecord {
      id,
      image_filename: Some(name.to_string()),
      image_url: Some(format!("/images/{}", name)),
      corrections: corrections.map(str::to_string),
    }
  }

  #[test]
  fn empty_payloads_never_download() {
    let dir = tempdir().unwrap();
    let source = MemorySource {
      records: vec![
        record(1, "a.png", Some("[]")),
        record(2, "b.png", None),
        record(3, "c.png", Some("  ")),
        record(4, "d.png", Some("null")),
      ],
      ..Default::default()
    };
    let sync = Synchronizer::new(&source, DatasetLayout::new(dir.path())).unwrap();

    let report = sync.sync().unwrap();
    assert_eq!(report.processed(), 0);
    assert_eq!(report.skipped.len(), 4);
    assert!(
      report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::NoCorrections)
    );
    assert!(source.fetched.lock().unwrap().is_empty());
    assert_eq!(
      std::fs::read_dir(sync.layout().labels_dir()).unwrap().count(),
      0
    );
  }

  #[test]
  fn failed_download_does_not_stop_the_run() {
    let dir = tempdir().unwrap();
    let boxes = r#"[{"class":1,"box":[0,0,10,10]}]"#;
    let source = MemorySource {
      records: vec![
        record(1, "missing.png", Some(boxes)),
        record(2, "present.png", Some(boxes)),
      ],
      images: HashMap::from([("/images/present.png".to_string(), png_bytes(20, 20))]),
      ..Default::default()
    };
    let sync = Synchronizer::new(&source, DatasetLayout::new(dir.path())).unwrap();

    let report = sync.sync().unwrap();
    assert_eq!(report.processed(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id, 1);
    assert!(matches!(report.skipped[0].reason, SkipReason::DownloadFailed(_)));

    let layout = sync.layout();
    assert!(!layout.images_dir().join("missing.png").exists());
    assert!(!layout.labels_dir().join("missing.txt").exists());
    assert_eq!(
      std::fs::read_to_string(layout.labels_dir().join("present.txt")).unwrap(),
      "1 0.250000 0.250000 0.500000 0.500000"
    );
  }

  #[test]
  fn undecodable_image_is_not_counted() {
    let dir = tempdir().unwrap();
    let source = MemorySource {
      records: vec![record(5, "broken.jpg", Some(r#"[{"class":0,"box":[1,1,2,2]}]"#))],
      images: HashMap::from([("/images/broken.jpg".to_string(), b"garbage".to_vec())]),
      ..Default::default()
    };
    let sync = Synchronizer::new(&source, DatasetLayout::new(dir.path())).unwrap();

    let report = sync.sync().unwrap();
    assert_eq!(report.processed(), 0);
    assert!(matches!(report.skipped[0].reason, SkipReason::ConvertFailed(_)));
    assert!(!sync.layout().labels_dir().join("broken.txt").exists());
    assert!(!sync.layout().images_dir().join("broken.jpg").exists());
  }

  #[test]
  fn corrupt_redownload_keeps_the_previous_pair() {
    let dir = tempdir().unwrap();
    let boxes = Some(r#"[{"class":2,"box":[10,10,50,50]}]"#);
    let good = MemorySource {
      records: vec![record(8, "t8.png", boxes)],
      images: HashMap::from([("/images/t8.png".to_string(), png_bytes(100, 100))]),
      ..Default::default()
    };
    let sync = Synchronizer::new(&good, DatasetLayout::new(dir.path())).unwrap();
    assert_eq!(sync.sync().unwrap().processed(), 1);

    let corrupt = MemorySource {
      records: vec![record(8, "t8.png", boxes)],
      images: HashMap::from([("/images/t8.png".to_string(), b"garbage".to_vec())]),
      ..Default::default()
    };
    let sync = Synchronizer::new(&corrupt, DatasetLayout::new(dir.path())).unwrap();
    let report = sync.sync().unwrap();
    assert_eq!(report.processed(), 0);
    assert!(matches!(report.skipped[0].reason, SkipReason::ConvertFailed(_)));

    let layout = sync.layout();
    assert_eq!(
      std::fs::read(layout.images_dir().join("t8.png")).unwrap(),
      png_bytes(100, 100)
    );
    assert_eq!(
      std::fs::read_to_string(layout.labels_dir().join("t8.txt")).unwrap(),
      "2 0.300000 0.300000 0.400000 0.400000"
    );
  }

  #[test]
  fn failed_label_write_removes_the_image() {
    let dir = tempdir().unwrap();
    let source = MemorySource {
      records: vec![record(9, "t9.png", Some(r#"[{"class":0,"box":[1,1,2,2]}]"#))],
      images: HashMap::from([("/images/t9.png".to_string(), png_bytes(10, 10))]),
      ..Default::default()
    };
    let sync = Synchronizer::new(&source, DatasetLayout::new(dir.path())).unwrap();
    // 标签路径被目录占用，写入必然失败
    std::fs::create_dir(sync.layout().labels_dir().join("t9.txt")).unwrap();

    let report = sync.sync().unwrap();
    assert_eq!(report.processed(), 0);
    assert!(matches!(report.skipped[0].reason, SkipReason::ConvertFailed(_)));
    assert!(!sync.layout().images_dir().join("t9.png").exists());
  }

  #[test]
  fn missing_or_unsafe_filenames_are_skipped() {
    let dir = tempdir().unwrap();
    let boxes = Some(r#"[{"class":0,"box":[1,1,2,2]}]"#);
    let mut no_url = record(1, "a.png", boxes);
    no_url.image_url = None;
    let source = MemorySource {
      records: vec![no_url, record(2, "../escape.png", boxes)],
      ..Default::default()
    };
    let sync = Synchronizer::new(&source, DatasetLayout::new(dir.path())).unwrap();

    let report = sync.sync().unwrap();
    assert_eq!(report.processed(), 0);
    assert_eq!(report.skipped[0].reason, SkipReason::MissingImage);
    assert!(matches!(report.skipped[1].reason, SkipReason::InvalidFilename(_)));
    assert!(source.fetched.lock().unwrap().is_empty());
  }

  struct GrowingSource {
    listings: Mutex<Vec<usize>>,
  }

  impl AnnotationSource for GrowingSource {
    fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError> {
      let mut listings = self.listings.lock().unwrap();
      let count = if listings.len() > 1 {
        listings.remove(0)
      } else {
        listings[0]
      };
      Ok((0..count as i64).map(|id| record(id, "x.png", None)).collect())
    }

    fn fetch_image(&self, _relative_url: &str) -> Result<Vec<u8>, SourceError> {
      unreachable!("records carry no corrections")
    }
  }

  #[test]
  fn due_sync_rebases_on_the_synced_listing() {
    let dir = tempdir().unwrap();
    // 检查时 5 条，真正同步时后端已经有 7 条
    let source = GrowingSource {
      listings: Mutex::new(vec![5, 7]),
    };
    let sync = Synchronizer::new(source, DatasetLayout::new(dir.path())).unwrap();
    let mut trigger = RetrainTrigger::new(5);

    let report = sync.sync_when_due(&mut trigger).unwrap().unwrap();
    assert_eq!(report.total(), 7);
    assert_eq!(trigger.baseline(), 7);

    assert!(sync.sync_when_due(&mut trigger).unwrap().is_none());
    assert_eq!(trigger.baseline(), 7);
  }

  #[test]
  fn failed_due_sync_keeps_the_baseline() {
    let dir = tempdir().unwrap();
    let sync = Synchronizer::new(FailingSource, DatasetLayout::new(dir.path())).unwrap();
    let mut trigger = RetrainTrigger::new(5);

    assert!(sync.sync_when_due(&mut trigger).is_err());
    assert_eq!(trigger.baseline(), 0);
  }

  struct FailingSource;

  impl AnnotationSource for FailingSource {
    fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError> {
      Err(SourceError::Status {
        url: "http://backend/records".to_string(),
        status: 500,
      })
    }

    fn fetch_image(&self, _relative_url: &str) -> Result<Vec<u8>, SourceError> {
      unreachable!("no records are listed")
    }
  }

  #[test]
  fn listing_failure_is_fatal() {
    let dir = tempdir().unwrap();
    let sync = Synchronizer::new(FailingSource, DatasetLayout::new(dir.path())).unwrap();
    assert!(matches!(
      sync.sync(),
      Err(SyncError::Source(SourceError::Status { status: 500, .. }))
    ));
  }

  struct BlockingSource {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
  }

  impl AnnotationSource for BlockingSource {
    fn list_records(&self) -> Result<Vec<AnnotationRecord>, SourceError> {
      self.entered.lock().unwrap().send(()).unwrap();
      self.release.lock().unwrap().recv().unwrap();
      Ok(Vec::new())
    }

    fn fetch_image(&self, _relative_url: &str) -> Result<Vec<u8>, SourceError> {
      unreachable!("no records are listed")
    }
  }

  #[test]
  fn concurrent_runs_are_rejected() {
    let dir = tempdir().unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let source = BlockingSource {
      entered: Mutex::new(entered_tx),
      release: Mutex::new(release_rx),
    };
    let sync = Synchronizer::new(source, DatasetLayout::new(dir.path())).unwrap();

    std::thread::scope(|s| {
      let first = s.spawn(|| sync.sync());
      entered_rx.recv().unwrap();

      assert!(matches!(sync.sync(), Err(SyncError::AlreadyRunning)));

      release_tx.send(()).unwrap();
      let report = first.join().unwrap().unwrap();
      assert_eq!(report.processed(), 0);
    });

    // 前一个任务结束后可以再次运行
    release_tx.send(()).unwrap();
    assert!(sync.sync().is_ok());
  }
}
