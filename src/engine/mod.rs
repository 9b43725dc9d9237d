// ==========================================
// 生产产能排程系统 - 引擎层
// ==========================================
// 职责: 对账 / 产能聚合 / 人工调整，不拼 SQL
// 红线: 所有读写通过 JobStore / ResourceRegistry
// ==========================================

pub mod capacity_aggregator;
pub mod error;
pub mod move_engine;
pub mod policy;
pub mod reconcile;
pub mod validation;

// 重导出核心引擎
pub use capacity_aggregator::CapacityAggregator;
pub use error::{ScheduleError, ScheduleResult};
pub use move_engine::{MoveEngine, MoveRequest};
pub use policy::{MovePolicy, ReconcilePolicy};
pub use reconcile::ReconciliationEngine;
pub use validation::RowValidator;
