// ==========================================
// 生产产能排程系统 - 作业数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: (department, process_order) 在任意时刻唯一
// ==========================================
// 职责: 管理 job 表，提供按车间的事务化合并写入
// 并发: 更新/删除带 revision 校验（乐观锁）
// ==========================================

use crate::db::DATETIME_FORMAT;
use crate::domain::job::Job;
use crate::domain::merge::UploadRecord;
use crate::domain::types::Department;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::upload_log_repo;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};

// ==========================================
// MergeBatch - 单车间合并写入批次
// ==========================================
/// 单车间一次对账的全部写入（整体提交或整体回滚）
#[derive(Debug, Clone, Default)]
pub struct MergeBatch {
    /// 新增作业
    pub inserts: Vec<Job>,
    /// 更新作业（revision 为读取时的值，用于乐观锁校验）
    pub updates: Vec<Job>,
    /// 删除作业: (process_order, 读取时的 revision)
    pub deletes: Vec<(String, i32)>,
    /// 上传溯源记录
    pub upload: Option<UploadRecord>,
}

impl MergeBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.upload.is_none()
    }
}

// ==========================================
// JobStore - 作业仓储接口
// ==========================================
/// 核心引擎通过该接口读写作业
pub trait JobStore: Send + Sync {
    /// 查询车间全部作业（按 process_order 排序）
    fn list_jobs(&self, department: Department) -> RepositoryResult<Vec<Job>>;

    /// 按业务主键查询作业
    fn get_job(&self, department: Department, process_order: &str)
        -> RepositoryResult<Option<Job>>;

    /// 批量插入或覆盖作业（不做 revision 校验）
    fn upsert_jobs(&self, department: Department, jobs: &[Job]) -> RepositoryResult<usize>;

    /// 批量删除作业
    fn delete_jobs(&self, department: Department, process_orders: &[String])
        -> RepositoryResult<usize>;

    /// 保存单个作业（revision 校验），返回写入后的作业
    fn save_job(&self, job: &Job) -> RepositoryResult<Job>;

    /// 原子地应用一次对账批次
    fn apply_merge(&self, department: Department, batch: &MergeBatch) -> RepositoryResult<()>;

    /// 车间最近一次上传记录
    fn latest_upload(&self, department: Department) -> RepositoryResult<Option<UploadRecord>>;
}

const SELECT_COLUMNS: &str = r#"
    job_id, department, process_order, machine, start_datetime,
    duration_hours, priority, end_product, status_flags,
    manual_override, override_reason, moved_by, moved_at,
    revision, created_at, updated_at
"#;

// ==========================================
// JobRepository - SQLite 实现
// ==========================================
pub struct JobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobRepository {
    /// 创建新的作业仓储实例（打开数据库并建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按车间统计作业数
    pub fn count_by_department(&self, department: Department) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job WHERE department = ?1",
            params![department.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn insert_job(conn: &Connection, job: &Job) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO job (
                job_id, department, process_order, machine, start_datetime,
                duration_hours, priority, end_product, status_flags,
                manual_override, override_reason, moved_by, moved_at,
                revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                job.id,
                job.department.as_str(),
                job.process_order,
                job.machine,
                format_datetime(&job.start_datetime),
                job.duration_hours,
                job.priority,
                job.end_product,
                serde_json::to_string(&job.status_flags)?,
                job.manual_override,
                job.override_reason,
                job.moved_by,
                job.moved_at.as_ref().map(format_datetime),
                job.revision,
                format_datetime(&job.created_at),
                format_datetime(&job.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 带 revision 校验的更新，成功后 revision + 1
    fn update_job_checked(conn: &Connection, job: &Job) -> RepositoryResult<()> {
        let affected = conn.execute(
            r#"
            UPDATE job SET
                machine = ?1,
                start_datetime = ?2,
                duration_hours = ?3,
                priority = ?4,
                end_product = ?5,
                status_flags = ?6,
                manual_override = ?7,
                override_reason = ?8,
                moved_by = ?9,
                moved_at = ?10,
                updated_at = ?11,
                revision = revision + 1
            WHERE department = ?12 AND process_order = ?13 AND revision = ?14
            "#,
            params![
                job.machine,
                format_datetime(&job.start_datetime),
                job.duration_hours,
                job.priority,
                job.end_product,
                serde_json::to_string(&job.status_flags)?,
                job.manual_override,
                job.override_reason,
                job.moved_by,
                job.moved_at.as_ref().map(format_datetime),
                format_datetime(&job.updated_at),
                job.department.as_str(),
                job.process_order,
                job.revision,
            ],
        )?;

        if affected == 0 {
            return Err(Self::revision_mismatch(
                conn,
                job.department,
                &job.process_order,
                job.revision,
            ));
        }
        Ok(())
    }

    /// 带 revision 校验的删除
    fn delete_job_checked(
        conn: &Connection,
        department: Department,
        process_order: &str,
        revision: i32,
    ) -> RepositoryResult<()> {
        let affected = conn.execute(
            "DELETE FROM job WHERE department = ?1 AND process_order = ?2 AND revision = ?3",
            params![department.as_str(), process_order, revision],
        )?;

        if affected == 0 {
            return Err(Self::revision_mismatch(conn, department, process_order, revision));
        }
        Ok(())
    }

    /// 判断是记录不存在还是 revision 冲突
    fn revision_mismatch(
        conn: &Connection,
        department: Department,
        process_order: &str,
        expected: i32,
    ) -> RepositoryError {
        let key = format!("{}/{}", department, process_order);
        let actual = conn
            .query_row(
                "SELECT revision FROM job WHERE department = ?1 AND process_order = ?2",
                params![department.as_str(), process_order],
                |row| row.get::<_, i32>(0),
            )
            .optional();

        match actual {
            Ok(Some(actual)) => RepositoryError::OptimisticLockFailure {
                key,
                expected,
                actual,
            },
            // 读取时存在、写入时已被删除，同样视为并发冲突
            Ok(None) => RepositoryError::OptimisticLockFailure {
                key,
                expected,
                actual: 0,
            },
            Err(e) => e.into(),
        }
    }

    fn query_one(
        conn: &Connection,
        department: Department,
        process_order: &str,
    ) -> RepositoryResult<Option<Job>> {
        let sql = format!(
            "SELECT {} FROM job WHERE department = ?1 AND process_order = ?2",
            SELECT_COLUMNS
        );
        let job = conn
            .query_row(&sql, params![department.as_str(), process_order], map_job_row)
            .optional()?;
        Ok(job)
    }
}

impl JobStore for JobRepository {
    fn list_jobs(&self, department: Department) -> RepositoryResult<Vec<Job>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM job WHERE department = ?1 ORDER BY process_order",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![department.as_str()], map_job_row)?
            .collect::<SqliteResult<Vec<Job>>>()?;
        Ok(jobs)
    }

    fn get_job(
        &self,
        department: Department,
        process_order: &str,
    ) -> RepositoryResult<Option<Job>> {
        let conn = self.get_conn()?;
        Self::query_one(&conn, department, process_order)
    }

    fn upsert_jobs(&self, department: Department, jobs: &[Job]) -> RepositoryResult<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO job (
                    job_id, department, process_order, machine, start_datetime,
                    duration_hours, priority, end_product, status_flags,
                    manual_override, override_reason, moved_by, moved_at,
                    revision, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(department, process_order) DO UPDATE SET
                    machine = excluded.machine,
                    start_datetime = excluded.start_datetime,
                    duration_hours = excluded.duration_hours,
                    priority = excluded.priority,
                    end_product = excluded.end_product,
                    status_flags = excluded.status_flags,
                    manual_override = excluded.manual_override,
                    override_reason = excluded.override_reason,
                    moved_by = excluded.moved_by,
                    moved_at = excluded.moved_at,
                    updated_at = excluded.updated_at,
                    revision = job.revision + 1
                "#,
            )?;

            for job in jobs {
                if job.department != department {
                    return Err(RepositoryError::FieldValueError {
                        field: "department".to_string(),
                        message: format!(
                            "作业{}属于{}，不能写入{}",
                            job.process_order, job.department, department
                        ),
                    });
                }

                stmt.execute(params![
                    job.id,
                    job.department.as_str(),
                    job.process_order,
                    job.machine,
                    format_datetime(&job.start_datetime),
                    job.duration_hours,
                    job.priority,
                    job.end_product,
                    serde_json::to_string(&job.status_flags)?,
                    job.manual_override,
                    job.override_reason,
                    job.moved_by,
                    job.moved_at.as_ref().map(format_datetime),
                    job.revision,
                    format_datetime(&job.created_at),
                    format_datetime(&job.updated_at),
                ])?;
            }
        }

        tx.commit()?;
        Ok(jobs.len())
    }

    fn delete_jobs(
        &self,
        department: Department,
        process_orders: &[String],
    ) -> RepositoryResult<usize> {
        if process_orders.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;

        {
            let mut stmt =
                tx.prepare("DELETE FROM job WHERE department = ?1 AND process_order = ?2")?;
            for process_order in process_orders {
                deleted += stmt.execute(params![department.as_str(), process_order])?;
            }
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn save_job(&self, job: &Job) -> RepositoryResult<Job> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::update_job_checked(&tx, job)?;

        let saved = Self::query_one(&tx, job.department, &job.process_order)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "Job".to_string(),
                id: format!("{}/{}", job.department, job.process_order),
            }
        })?;

        tx.commit()?;
        Ok(saved)
    }

    fn apply_merge(&self, department: Department, batch: &MergeBatch) -> RepositoryResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn()?;
        // IMMEDIATE: 开始即获取写锁，其他连接的读者只会看到合并前或合并后的状态
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for job in &batch.inserts {
            Self::insert_job(&tx, job)?;
        }
        for job in &batch.updates {
            Self::update_job_checked(&tx, job)?;
        }
        for (process_order, revision) in &batch.deletes {
            Self::delete_job_checked(&tx, department, process_order, *revision)?;
        }
        if let Some(record) = &batch.upload {
            upload_log_repo::insert_record(&tx, record)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn latest_upload(&self, department: Department) -> RepositoryResult<Option<UploadRecord>> {
        let conn = self.get_conn()?;
        upload_log_repo::query_latest(&conn, department)
    }
}

// ==========================================
// 行映射辅助函数
// ==========================================

fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn parse_datetime(idx: usize, raw: &str) -> SqliteResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_job_row(row: &Row<'_>) -> SqliteResult<Job> {
    let department_raw: String = row.get(1)?;
    let department = Department::parse(&department_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("未知车间: {}", department_raw).into(),
        )
    })?;

    let status_flags_raw: String = row.get(8)?;
    let status_flags: Vec<String> = serde_json::from_str(&status_flags_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let moved_at = match row.get::<_, Option<String>>(12)? {
        Some(raw) => Some(parse_datetime(12, &raw)?),
        None => None,
    };

    Ok(Job {
        id: row.get(0)?,
        department,
        process_order: row.get(2)?,
        machine: row.get(3)?,
        start_datetime: parse_datetime(4, &row.get::<_, String>(4)?)?,
        duration_hours: row.get(5)?,
        priority: row.get(6)?,
        end_product: row.get(7)?,
        status_flags,
        manual_override: row.get(9)?,
        override_reason: row.get(10)?,
        moved_by: row.get(11)?,
        moved_at,
        revision: row.get(13)?,
        created_at: parse_datetime(14, &row.get::<_, String>(14)?)?,
        updated_at: parse_datetime(15, &row.get::<_, String>(15)?)?,
    })
}
