// ==========================================
// 生产产能排程系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::CapacityApi;
use crate::config::config_manager::ConfigManager;
use crate::db::{init_schema, open_sqlite_connection};
use crate::repository::{JobRepository, MachineRepository, UploadLogRepository};

/// 应用状态
///
/// 所有仓储共享同一个数据库连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 产能排程API
    pub capacity_api: Arc<CapacityApi>,

    /// 配置管理器（策略开关）
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 说明
    /// 打开连接 → 建表（幂等）→ 初始化仓储与API
    pub fn new(db_path: String) -> anyhow::Result<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)?;
        init_schema(&conn)?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let job_repo = Arc::new(JobRepository::from_connection(conn.clone()));
        let machine_repo = Arc::new(MachineRepository::from_connection(conn.clone()));
        let upload_log_repo = Arc::new(UploadLogRepository::from_connection(conn.clone()));
        let config_manager = Arc::new(ConfigManager::from_connection(conn)?);

        // ==========================================
        // 初始化API层
        // ==========================================
        let capacity_api = Arc::new(CapacityApi::new(
            job_repo,
            machine_repo,
            upload_log_repo,
            config_manager.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            capacity_api,
            config_manager,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 PRODUCTION_CAPACITY_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("PRODUCTION_CAPACITY_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./production_capacity.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("production-capacity");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("production_capacity.db");
        } else {
            tracing::warn!("无法创建数据目录 {}，使用当前目录", dir.display());
        }
    }

    path.to_string_lossy().to_string()
}
