// ==========================================
// 生产产能排程系统 - 作业领域模型
// ==========================================
// 红线: manual_override=true 的作业，排程字段不可被上传覆盖
// ==========================================

use crate::domain::types::Department;
use chrono::{Duration, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// JobRow - 排程表输入行
// ==========================================
// 由排程表数据源产出的固定结构，进入对账前需经过行校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRow {
    pub process_order: String,        // 工单号 (车间内唯一)
    pub machine: String,              // 机台
    pub start_datetime: NaiveDateTime, // 计划开始时间
    pub duration_hours: f64,          // 工时 (小时, >0)
    pub priority: i32,                // 优先级 (越小越紧急)
    pub end_product: Option<String>,  // 成品描述
    #[serde(default)]
    pub status_flags: Vec<String>,    // 源表状态标记
}

// ==========================================
// Job - 作业
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    // ===== 标识 =====
    pub id: String,                    // 仓储分配ID (UUID)
    pub department: Department,        // 车间
    pub process_order: String,         // 工单号 (业务主键)

    // ===== 排程字段 (受人工调整保护) =====
    pub machine: String,
    pub start_datetime: NaiveDateTime,
    pub duration_hours: f64,
    pub priority: i32,

    // ===== 描述字段 (每次上传刷新) =====
    pub end_product: Option<String>,
    pub status_flags: Vec<String>,

    // ===== 人工调整 =====
    pub manual_override: bool,
    pub override_reason: Option<String>,
    pub moved_by: Option<String>,
    pub moved_at: Option<NaiveDateTime>,

    // ===== 元信息 =====
    pub revision: i32,                 // 乐观锁修订号
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Job {
    /// 由上传行创建新作业（未被人工调整）
    pub fn from_row(department: Department, row: &JobRow, now: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            department,
            process_order: row.process_order.clone(),
            machine: row.machine.clone(),
            start_datetime: row.start_datetime,
            duration_hours: row.duration_hours,
            priority: row.priority,
            end_product: row.end_product.clone(),
            status_flags: row.status_flags.clone(),
            manual_override: false,
            override_reason: None,
            moved_by: None,
            moved_at: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// 计划结束时间 = 开始 + 工时；超出日期范围时为 None
    pub fn end_datetime(&self) -> Option<NaiveDateTime> {
        schedule_end(self.start_datetime, self.duration_hours)
    }

    /// 排程字段与上传行是否一致
    pub fn schedule_matches(&self, row: &JobRow) -> bool {
        self.machine == row.machine
            && self.start_datetime == row.start_datetime
            && self.duration_hours == row.duration_hours
            && self.priority == row.priority
    }

    /// 描述字段与上传行是否一致
    pub fn descriptive_matches(&self, row: &JobRow) -> bool {
        self.end_product == row.end_product && self.status_flags == row.status_flags
    }

    /// 覆盖排程字段
    pub fn apply_schedule(&mut self, row: &JobRow) {
        self.machine = row.machine.clone();
        self.start_datetime = row.start_datetime;
        self.duration_hours = row.duration_hours;
        self.priority = row.priority;
    }

    /// 覆盖描述字段
    pub fn apply_descriptive(&mut self, row: &JobRow) {
        self.end_product = row.end_product.clone();
        self.status_flags = row.status_flags.clone();
    }
}

/// 单个作业工时上限（小时），约十年
pub const MAX_DURATION_HOURS: f64 = 24.0 * 366.0 * 10.0;

/// 小时数转换为 chrono::Duration（精确到秒）；非有限值或超出范围时为 None
pub fn hours_to_duration(hours: f64) -> Option<Duration> {
    let seconds = (hours * 3600.0).round();
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_seconds(seconds as i64)
}

/// 开始 + 工时，溢出时为 None
pub fn schedule_end(start: NaiveDateTime, hours: f64) -> Option<NaiveDateTime> {
    start.checked_add_signed(hours_to_duration(hours)?)
}

/// 存储精度为整秒，入库前截掉亚秒部分
pub fn to_storage_precision(value: NaiveDateTime) -> NaiveDateTime {
    value.trunc_subsecs(0)
}
