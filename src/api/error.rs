// ==========================================
// 生产产能排程系统 - API层错误类型
// ==========================================
// 职责: 汇总各层错误，转换为面向调用方的错误消息
// ==========================================

use crate::engine::error::ScheduleError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("并发写入冲突: {0}")]
    ConflictingWrite(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            ScheduleError::NotFound(msg) => ApiError::NotFound(msg),
            ScheduleError::ConflictingWrite(msg) => ApiError::ConflictingWrite(msg),
            ScheduleError::StoreUnavailable(msg) => ApiError::StoreUnavailable(msg),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            other => ScheduleError::from(other).into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::ImportError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::InternalError(format!("后台任务异常终止: {}", err))
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_failure_maps_to_conflicting_write() {
        let err: ApiError = RepositoryError::OptimisticLockFailure {
            key: "MILLING/PO-1".to_string(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(matches!(err, ApiError::ConflictingWrite(_)));
    }

    #[test]
    fn test_field_value_maps_to_invalid_input() {
        let err: ApiError = RepositoryError::FieldValueError {
            field: "name".to_string(),
            message: "机台名称不能为空".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::InvalidInput(msg) if msg.contains("name")));
    }

    #[test]
    fn test_import_error_keeps_message() {
        let err: ApiError = ImportError::UnsupportedFormat("txt".to_string()).into();
        assert!(matches!(err, ApiError::ImportError(msg) if msg.contains("txt")));
    }

    #[tokio::test]
    async fn test_panicked_task_maps_to_internal_error() {
        let join_err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        let err: ApiError = join_err.into();
        assert!(matches!(err, ApiError::InternalError(_)));
    }
}
