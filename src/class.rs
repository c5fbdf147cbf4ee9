// 该文件是 Thermal Dataset 项目的一部分。
// src/class.rs - 异常类别与严重程度
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

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassError {
  #[error("未知的类别编号: {0}")]
  UnknownClassId(u32),
}

/// 带有固定编号和名称的标签类型
pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> &'static str;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Result<Self, ClassError>;
}

/// 热成像异常检测模型的输出类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyClass {
  Faulty,
  Normal,
  PotentiallyFaulty,
}

/// 检测结果的严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
  Critical,
  Normal,
  Warning,
}

// 编号, 类别, 名称, 严重程度
static CLASS_TABLE: [(u32, AnomalyClass, &str, Severity); 3] = [
  (0, AnomalyClass::Faulty, "Faulty", Severity::Critical),
  (1, AnomalyClass::Normal, "Normal", Severity::Normal),
  (
    2,
    AnomalyClass::PotentiallyFaulty,
    "Potentially Faulty",
    Severity::Warning,
  ),
];

impl AnomalyClass {
  pub const ALL: [AnomalyClass; 3] = [
    AnomalyClass::Faulty,
    AnomalyClass::Normal,
    AnomalyClass::PotentiallyFaulty,
  ];

  fn entry(&self) -> &'static (u32, AnomalyClass, &'static str, Severity) {
    match self {
      AnomalyClass::Faulty => &CLASS_TABLE[0],
      AnomalyClass::Normal => &CLASS_TABLE[1],
      AnomalyClass::PotentiallyFaulty => &CLASS_TABLE[2],
    }
  }

  pub fn severity(&self) -> Severity {
    self.entry().3
  }
}

impl WithLabel for AnomalyClass {
  fn to_label_str(&self) -> &'static str {
    self.entry().2
  }

  fn to_label_id(&self) -> u32 {
    self.entry().0
  }

  fn from_label_id(id: u32) -> Result<Self, ClassError> {
    CLASS_TABLE
      .iter()
      .find(|(class_id, ..)| *class_id == id)
      .map(|(_, class, ..)| *class)
      .ok_or(ClassError::UnknownClassId(id))
  }
}

impl TryFrom<u32> for AnomalyClass {
  type Error = ClassError;

  fn try_from(id: u32) -> Result<Self, Self::Error> {
    AnomalyClass::from_label_id(id)
  }
}

impl std::fmt::Display for AnomalyClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.to_label_str())
  }
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Critical => "Critical",
      Severity::Normal => "Normal",
      Severity::Warning => "Warning",
    }
  }
}

impl std::fmt::Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
