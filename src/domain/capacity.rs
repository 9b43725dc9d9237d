// ==========================================
// 生产产能排程系统 - 产能视图领域模型
// ==========================================
// 说明: 以下结构均为派生视图，不落库，每次读取重新计算
// ==========================================

use crate::domain::job::Job;
use crate::domain::merge::UploadRecord;
use crate::domain::types::Department;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// GanttSegment - 甘特图时间段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GanttSegment {
    pub machine: String,
    pub process_order: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub priority: i32,
    pub manual_override: bool,
    pub overlaps_previous: bool, // 与同机台前一段重叠（仅用于展示提示）
}

// ==========================================
// MachineSummary - 机台负荷汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSummary {
    pub machine: String,
    pub is_active: bool,
    pub registered: bool,                   // 是否在机台登记表中
    pub job_count: usize,
    pub scheduled_hours: f64,
    pub first_start: Option<NaiveDateTime>,
    pub next_free_at: Option<NaiveDateTime>, // 最晚结束时间
    pub utilization_pct: f64,               // 排程工时 / 车间时间窗
    pub overlap_count: usize,
}

// ==========================================
// CapacitySnapshot - 车间产能快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub department: Department,
    pub machines: Vec<MachineSummary>,
    pub jobs: Vec<Job>,
    pub segments: Vec<GanttSegment>,
    pub last_upload: Option<UploadRecord>,
    pub horizon_start: Option<NaiveDateTime>,
    pub horizon_end: Option<NaiveDateTime>,
    pub generated_at: NaiveDateTime,
}

impl CapacitySnapshot {
    /// 排程总工时
    pub fn total_scheduled_hours(&self) -> f64 {
        self.machines.iter().map(|m| m.scheduled_hours).sum()
    }

    /// 空闲机台（启用但无作业）
    pub fn idle_machines(&self) -> Vec<&MachineSummary> {
        self.machines
            .iter()
            .filter(|m| m.is_active && m.job_count == 0)
            .collect()
    }

    /// 查询指定机台汇总
    pub fn machine(&self, name: &str) -> Option<&MachineSummary> {
        self.machines.iter().find(|m| m.machine == name)
    }
}
