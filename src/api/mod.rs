// ==========================================
// 生产产能排程系统 - API 层
// ==========================================
// 职责: 面向 CLI / 上层调用方的业务接口
// ==========================================

pub mod capacity_api;
pub mod error;

pub use capacity_api::{CapacityApi, DepartmentOutcome, UploadSummary};
pub use error::{ApiError, ApiResult};
