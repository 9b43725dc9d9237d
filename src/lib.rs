// ==========================================
// 生产产能排程系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 排程表对账 + 产能聚合 (人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 对账/聚合/调整
pub mod engine;

// 导入层 - 排程表文件
pub mod importer;

// 配置层 - 策略配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::types::Department;

pub use domain::{
    CapacitySnapshot, GanttSegment, Job, JobRow, Machine, MachineSummary, MergeResult,
    ReconcileReport, RowIssue, UploadRecord,
};

pub use engine::{
    CapacityAggregator, MoveEngine, MovePolicy, MoveRequest, ReconcilePolicy,
    ReconciliationEngine, ScheduleError,
};

pub use api::{CapacityApi, UploadSummary};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "生产产能排程系统";
