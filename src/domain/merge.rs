// ==========================================
// 生产产能排程系统 - 对账结果领域模型
// ==========================================

use crate::domain::types::Department;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

// ==========================================
// MergeResult - 三方合并计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub added: usize,     // 新增作业
    pub removed: usize,   // 上传中消失而删除的作业
    pub preserved: usize, // 人工调整被保留的作业
    pub updated: usize,   // 未调整且字段有变化的作业
    pub unchanged: usize, // 未调整且字段无变化的作业
    pub retained: usize,  // 上传中消失但按策略保留的人工调整作业
}

impl AddAssign for MergeResult {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.preserved += other.preserved;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.retained += other.retained;
    }
}

// ==========================================
// RowIssue - 行级问题（跳过但不中断）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub row_index: usize,              // 行号 (从 0 开始，对应输入顺序)
    pub process_order: Option<String>,
    pub reason: String,
}

impl RowIssue {
    pub fn new(row_index: usize, process_order: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            row_index,
            process_order: process_order
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            reason: reason.into(),
        }
    }
}

// ==========================================
// ReconcileReport - 单车间对账报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub department: Department,
    pub merge: MergeResult,
    pub skipped: Vec<RowIssue>,
}

impl ReconcileReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

// ==========================================
// UploadRecord - 上传溯源记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: String,
    pub department: Department,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: NaiveDateTime,
    pub added: usize,
    pub removed: usize,
    pub preserved: usize,
    pub skipped: usize,
}
