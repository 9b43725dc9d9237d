// ==========================================
// 生产产能排程系统 - 机台领域模型
// ==========================================

use crate::domain::types::Department;
use serde::{Deserialize, Serialize};

/// 机台（车间内的产能资源）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,                // 机台名 (车间内唯一)
    pub department: Department,      // 所属车间
    pub is_active: bool,             // 是否启用
    pub description: Option<String>, // 备注
}

impl Machine {
    pub fn new(department: Department, name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            department,
            is_active: true,
            description: None,
        }
    }
}
