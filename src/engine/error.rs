// ==========================================
// 生产产能排程系统 - 引擎层错误类型
// ==========================================
// 错误分类: InvalidInput / NotFound / ConflictingWrite / StoreUnavailable
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("并发写入冲突: {0}")]
    ConflictingWrite(String),

    #[error("存储不可用: {0}")]
    StoreUnavailable(String),
}

impl From<RepositoryError> for ScheduleError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure { .. }
            | RepositoryError::UniqueConstraintViolation(_) => {
                ScheduleError::ConflictingWrite(err.to_string())
            }
            RepositoryError::NotFound { entity, id } => {
                ScheduleError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            other => ScheduleError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
