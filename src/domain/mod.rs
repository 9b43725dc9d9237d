// ==========================================
// 生产产能排程系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、派生视图
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod capacity;
pub mod job;
pub mod machine;
pub mod merge;
pub mod types;

// 重导出核心类型
pub use capacity::{CapacitySnapshot, GanttSegment, MachineSummary};
pub use job::{
    hours_to_duration, schedule_end, to_storage_precision, Job, JobRow, MAX_DURATION_HOURS,
};
pub use machine::Machine;
pub use merge::{MergeResult, ReconcileReport, RowIssue, UploadRecord};
pub use types::Department;
