// ==========================================
// 生产产能排程系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 车间 (Department)
// ==========================================
// 每个车间拥有独立的机台集合与作业流，process_order 只在车间内唯一
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Department {
    Milling,     // 铣削
    Turning,     // 车削
    SlidingHead, // 走心机
    Misc,        // 其他
}

impl Department {
    /// 全部车间（固定顺序，用于批量对账与汇总输出）
    pub const ALL: [Department; 4] = [
        Department::Milling,
        Department::Turning,
        Department::SlidingHead,
        Department::Misc,
    ];

    /// 数据库存储值
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Milling => "MILLING",
            Department::Turning => "TURNING",
            Department::SlidingHead => "SLIDING_HEAD",
            Department::Misc => "MISC",
        }
    }

    /// 从字符串解析车间
    ///
    /// 兼容排程表中常见的写法: "Sliding Head" / "sliding-head" / "SLIDING_HEAD"
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();

        match normalized.as_str() {
            "MILLING" => Some(Department::Milling),
            "TURNING" => Some(Department::Turning),
            "SLIDING_HEAD" | "SLIDINGHEAD" => Some(Department::SlidingHead),
            "MISC" | "MISCELLANEOUS" => Some(Department::Misc),
            _ => None,
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
