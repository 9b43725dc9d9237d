// ==========================================
// 生产产能排程系统 - 上传溯源数据仓储
// ==========================================
// 职责: 管理 upload_log 表 (每次成功对账一条记录)
// 说明: 写入必须与对账在同一事务中完成，因此提供基于 &Connection 的函数
// ==========================================

use crate::db::DATETIME_FORMAT;
use crate::domain::merge::UploadRecord;
use crate::domain::types::Department;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    upload_id, department, file_name, uploaded_by, uploaded_at,
    added, removed, preserved, skipped
"#;

/// 在给定连接/事务上写入一条上传记录
pub fn insert_record(conn: &Connection, record: &UploadRecord) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO upload_log (
            upload_id, department, file_name, uploaded_by, uploaded_at,
            added, removed, preserved, skipped
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            record.upload_id,
            record.department.as_str(),
            record.file_name,
            record.uploaded_by,
            record.uploaded_at.format(DATETIME_FORMAT).to_string(),
            record.added as i64,
            record.removed as i64,
            record.preserved as i64,
            record.skipped as i64,
        ],
    )?;
    Ok(())
}

/// 查询车间最近一次上传记录
pub fn query_latest(
    conn: &Connection,
    department: Department,
) -> RepositoryResult<Option<UploadRecord>> {
    let sql = format!(
        "SELECT {} FROM upload_log WHERE department = ?1 ORDER BY uploaded_at DESC, rowid DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let record = conn
        .query_row(&sql, params![department.as_str()], map_row)
        .optional()?;
    Ok(record)
}

fn map_row(row: &Row<'_>) -> SqliteResult<UploadRecord> {
    let department_raw: String = row.get(1)?;
    let uploaded_at_raw: String = row.get(4)?;

    Ok(UploadRecord {
        upload_id: row.get(0)?,
        department: Department::parse(&department_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("未知车间: {}", department_raw).into(),
            )
        })?,
        file_name: row.get(2)?,
        uploaded_by: row.get(3)?,
        uploaded_at: NaiveDateTime::parse_from_str(&uploaded_at_raw, DATETIME_FORMAT).map_err(
            |e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)),
        )?,
        added: row.get::<_, i64>(5)? as usize,
        removed: row.get::<_, i64>(6)? as usize,
        preserved: row.get::<_, i64>(7)? as usize,
        skipped: row.get::<_, i64>(8)? as usize,
    })
}

// ==========================================
// UploadLogRepository - 上传溯源仓储（只读查询）
// ==========================================
pub struct UploadLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl UploadLogRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 最近一次上传
    pub fn find_latest(&self, department: Department) -> RepositoryResult<Option<UploadRecord>> {
        let conn = self.get_conn()?;
        query_latest(&conn, department)
    }

    /// 车间上传历史（按时间倒序）
    pub fn list_by_department(
        &self,
        department: Department,
        limit: usize,
    ) -> RepositoryResult<Vec<UploadRecord>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM upload_log WHERE department = ?1 ORDER BY uploaded_at DESC, rowid DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![department.as_str(), limit as i64], map_row)?
            .collect::<SqliteResult<Vec<UploadRecord>>>()?;
        Ok(records)
    }
}
