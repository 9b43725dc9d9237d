// ==========================================
// 生产产能排程系统 - 策略配置读取 Trait
// ==========================================
// 职责: 定义 API 层所需的策略读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::engine::policy::{MovePolicy, ReconcilePolicy};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// PolicyConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait PolicyConfigReader: Send + Sync {
    /// 获取对账策略
    ///
    /// # 默认值
    /// - retain_orphaned_overrides = false
    async fn get_reconcile_policy(&self) -> RepositoryResult<ReconcilePolicy>;

    /// 获取人工调整策略
    ///
    /// # 默认值
    /// - strict_machine_check = false
    async fn get_move_policy(&self) -> RepositoryResult<MovePolicy>;
}
