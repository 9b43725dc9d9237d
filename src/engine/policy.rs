// ==========================================
// 生产产能排程系统 - 引擎策略
// ==========================================
// 两个开放问题以显式策略表达，默认值保持宽松行为
// ==========================================

use serde::{Deserialize, Serialize};

/// 对账策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    /// 人工调整过的作业在上传中消失时是否保留（默认 false: 一律删除）
    pub retain_orphaned_overrides: bool,
}

/// 人工调整策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePolicy {
    /// 目标机台必须已登记且启用（默认 false: 仅告警）
    pub strict_machine_check: bool,
}
