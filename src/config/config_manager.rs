// ==========================================
// 生产产能排程系统 - 配置管理器
// ==========================================
// 职责: 策略配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::policy_config_trait::PolicyConfigReader;
use crate::db::open_sqlite_connection;
use crate::engine::policy::{MovePolicy, ReconcilePolicy};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取布尔配置，带默认值
    ///
    /// 接受 true/false/1/0/yes/no（不区分大小写），无法识别时返回默认值
    pub fn get_bool_or_default(&self, key: &str, default: bool) -> RepositoryResult<bool> {
        let value = match self.get_global_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        let parsed = match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        };

        Ok(parsed.unwrap_or_else(|| {
            tracing::warn!(key, value = %value, "配置值无法解析为布尔，使用默认值");
            default
        }))
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(json!(config_map).to_string())
    }

    /// 当前对账策略
    pub fn reconcile_policy(&self) -> RepositoryResult<ReconcilePolicy> {
        Ok(ReconcilePolicy {
            retain_orphaned_overrides: self
                .get_bool_or_default(config_keys::RETAIN_ORPHANED_OVERRIDES, false)?,
        })
    }

    /// 当前人工调整策略
    pub fn move_policy(&self) -> RepositoryResult<MovePolicy> {
        Ok(MovePolicy {
            strict_machine_check: self
                .get_bool_or_default(config_keys::STRICT_MACHINE_CHECK, false)?,
        })
    }
}

#[async_trait]
impl PolicyConfigReader for ConfigManager {
    async fn get_reconcile_policy(&self) -> RepositoryResult<ReconcilePolicy> {
        self.reconcile_policy()
    }

    async fn get_move_policy(&self) -> RepositoryResult<MovePolicy> {
        self.move_policy()
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 对账: 上传中消失的人工调整作业是否保留
    pub const RETAIN_ORPHANED_OVERRIDES: &str = "reconcile.retain_orphaned_overrides";

    // 人工调整: 目标机台必须已登记且启用
    pub const STRICT_MACHINE_CHECK: &str = "move.strict_machine_check";
}
