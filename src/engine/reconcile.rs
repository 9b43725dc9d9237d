// ==========================================
// 生产产能排程系统 - 排程表对账引擎
// ==========================================
// 职责: 将新上传的排程行与车间现有作业做三方合并
// 输入: 车间 + 上传行 + 上传人 + 源文件名
// 输出: ReconcileReport (added/removed/preserved + 跳过行)
// ==========================================
// 红线: manual_override=true 的作业，机台/开始/工时/优先级不可被覆盖
// 红线: 单车间写入整体提交或整体回滚
// ==========================================

use crate::domain::job::Job;
use crate::domain::merge::{MergeResult, ReconcileReport, UploadRecord};
use crate::domain::types::Department;
use crate::domain::JobRow;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::policy::ReconcilePolicy;
use crate::engine::validation::{RowValidator, ValidRow};
use crate::repository::job_repo::{JobStore, MergeBatch};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ReconciliationEngine - 对账引擎
// ==========================================
pub struct ReconciliationEngine {
    store: Arc<dyn JobStore>,
    policy: ReconcilePolicy,
}

impl ReconciliationEngine {
    /// 创建对账引擎
    ///
    /// # 参数
    /// - store: 作业仓储
    /// - policy: 对账策略
    pub fn new(store: Arc<dyn JobStore>, policy: ReconcilePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// 对单个车间执行对账（主入口）
    ///
    /// # 流程
    /// 1. 行校验（失败行记入 skipped，不中断）
    /// 2. 读取车间现有作业
    /// 3. 计算合并批次
    /// 4. 事务化写入（含上传溯源记录）
    ///
    /// # 错误
    /// - InvalidInput: 上传非空但没有任何有效行
    /// - ConflictingWrite: 读取后有作业被并发修改，整个车间回滚
    /// - StoreUnavailable: 存储失败，整个车间回滚
    #[instrument(skip(self, rows), fields(department = %department, rows = rows.len()))]
    pub fn reconcile(
        &self,
        department: Department,
        rows: Vec<JobRow>,
        uploaded_by: &str,
        source_file_name: &str,
    ) -> ScheduleResult<ReconcileReport> {
        let total_rows = rows.len();
        let (valid_rows, skipped) = RowValidator::validate(rows);

        for issue in &skipped {
            warn!(
                row = issue.row_index,
                process_order = ?issue.process_order,
                reason = %issue.reason,
                "跳过无效排程行"
            );
        }

        // 整表无有效行视为文件不可读，避免误删整个车间
        if total_rows > 0 && valid_rows.is_empty() {
            return Err(ScheduleError::InvalidInput(format!(
                "{}车间上传的{}行全部无效",
                department, total_rows
            )));
        }

        let current = self.store.list_jobs(department)?;
        let now = chrono::Local::now().naive_local();

        let (mut batch, merge) =
            plan_merge(department, current, valid_rows, self.policy, now);

        let actor = if uploaded_by.trim().is_empty() {
            "system"
        } else {
            uploaded_by.trim()
        };

        batch.upload = Some(UploadRecord {
            upload_id: Uuid::new_v4().to_string(),
            department,
            file_name: source_file_name.to_string(),
            uploaded_by: actor.to_string(),
            uploaded_at: now,
            added: merge.added,
            removed: merge.removed,
            preserved: merge.preserved,
            skipped: skipped.len(),
        });

        self.store.apply_merge(department, &batch).map_err(|e| {
            warn!(error = %e, "对账写入失败，车间状态已回滚");
            ScheduleError::from(e)
        })?;

        info!(
            added = merge.added,
            removed = merge.removed,
            preserved = merge.preserved,
            updated = merge.updated,
            retained = merge.retained,
            skipped = skipped.len(),
            "车间对账完成"
        );

        Ok(ReconcileReport {
            department,
            merge,
            skipped,
        })
    }
}

/// 计算合并批次（纯函数，不访问仓储）
///
/// # 参数
/// - current: 车间现有作业
/// - valid_rows: 校验通过的上传行（process_order 已去重）
///
/// # 返回
/// (写入批次, 合并计数)
pub fn plan_merge(
    department: Department,
    current: Vec<Job>,
    valid_rows: Vec<ValidRow>,
    policy: ReconcilePolicy,
    now: NaiveDateTime,
) -> (MergeBatch, MergeResult) {
    let mut batch = MergeBatch::default();
    let mut merge = MergeResult::default();

    let mut existing: HashMap<String, Job> = current
        .into_iter()
        .map(|job| (job.process_order.clone(), job))
        .collect();

    // 1. 上传行: 新增 / 覆盖 / 保留人工调整
    for (_, row) in valid_rows {
        match existing.remove(&row.process_order) {
            None => {
                debug!(process_order = %row.process_order, "新增作业");
                batch.inserts.push(Job::from_row(department, &row, now));
                merge.added += 1;
            }
            Some(mut job) if job.manual_override => {
                debug!(process_order = %row.process_order, "保留人工调整，仅刷新描述字段");
                if !job.descriptive_matches(&row) {
                    job.apply_descriptive(&row);
                    job.updated_at = now;
                    batch.updates.push(job);
                }
                merge.preserved += 1;
            }
            Some(mut job) => {
                if job.schedule_matches(&row) && job.descriptive_matches(&row) {
                    merge.unchanged += 1;
                } else {
                    job.apply_schedule(&row);
                    job.apply_descriptive(&row);
                    job.updated_at = now;
                    batch.updates.push(job);
                    merge.updated += 1;
                }
            }
        }
    }

    // 2. 上传中消失的作业: 删除（或按策略保留人工调整）
    let mut orphans: Vec<Job> = existing.into_values().collect();
    orphans.sort_by(|a, b| a.process_order.cmp(&b.process_order));

    for job in orphans {
        if job.manual_override && policy.retain_orphaned_overrides {
            debug!(process_order = %job.process_order, "上传中消失，按策略保留人工调整作业");
            merge.retained += 1;
        } else {
            debug!(process_order = %job.process_order, "上传中消失，删除作业");
            batch.deletes.push((job.process_order, job.revision));
            merge.removed += 1;
        }
    }

    (batch, merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::job_repo::JobRepository;
    use crate::repository::RepositoryError;
    use crate::repository::RepositoryResult;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn row(process_order: &str, machine: &str, day: u32, duration: f64, priority: i32) -> JobRow {
        JobRow {
            process_order: process_order.to_string(),
            machine: machine.to_string(),
            start_datetime: ts(day, 8),
            duration_hours: duration,
            priority,
            end_product: Some(format!("{}-part", process_order)),
            status_flags: vec![],
        }
    }

    fn setup() -> (Arc<JobRepository>, ReconciliationEngine) {
        setup_with_policy(ReconcilePolicy::default())
    }

    fn setup_with_policy(policy: ReconcilePolicy) -> (Arc<JobRepository>, ReconciliationEngine) {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = Arc::new(JobRepository::from_connection(Arc::new(Mutex::new(conn))));
        let engine = ReconciliationEngine::new(repo.clone(), policy);
        (repo, engine)
    }

    /// 将作业标记为人工调整
    fn mark_override(repo: &JobRepository, department: Department, process_order: &str) {
        let mut job = repo.get_job(department, process_order).unwrap().unwrap();
        job.manual_override = true;
        job.moved_by = Some("planner".to_string());
        repo.save_job(&job).unwrap();
    }

    // ==========================================
    // 基础合并测试
    // ==========================================

    #[test]
    fn test_initial_upload_adds_all() {
        let (repo, engine) = setup();
        let report = engine
            .reconcile(
                Department::Milling,
                vec![row("A", "M1", 1, 2.0, 1), row("B", "M2", 1, 3.0, 2)],
                "alice",
                "schedule.xlsx",
            )
            .unwrap();

        assert_eq!(report.merge.added, 2);
        assert_eq!(report.merge.removed, 0);
        assert_eq!(repo.list_jobs(Department::Milling).unwrap().len(), 2);

        let upload = repo.latest_upload(Department::Milling).unwrap().unwrap();
        assert_eq!(upload.file_name, "schedule.xlsx");
        assert_eq!(upload.uploaded_by, "alice");
        assert_eq!(upload.added, 2);
    }

    #[test]
    fn test_reupload_is_idempotent() {
        let (repo, engine) = setup();
        let rows = vec![row("A", "M1", 1, 2.0, 1), row("B", "M2", 2, 3.0, 2)];

        engine
            .reconcile(Department::Turning, rows.clone(), "alice", "v1.xlsx")
            .unwrap();
        let before = repo.list_jobs(Department::Turning).unwrap();

        let report = engine
            .reconcile(Department::Turning, rows, "alice", "v1.xlsx")
            .unwrap();
        let after = repo.list_jobs(Department::Turning).unwrap();

        assert_eq!(report.merge.added, 0);
        assert_eq!(report.merge.removed, 0);
        assert_eq!(report.merge.unchanged, 2);
        assert_eq!(before, after);
    }

    #[test]
    fn test_addition_and_removal() {
        let (repo, engine) = setup();
        engine
            .reconcile(
                Department::Misc,
                vec![row("A", "X1", 1, 1.0, 1), row("B", "X1", 1, 1.0, 1), row("C", "X2", 1, 1.0, 1)],
                "alice",
                "v1.csv",
            )
            .unwrap();
        mark_override(&repo, Department::Misc, "B");

        let report = engine
            .reconcile(
                Department::Misc,
                vec![row("B", "X9", 3, 5.0, 9), row("C", "X2", 1, 1.0, 1), row("D", "X3", 2, 2.0, 1)],
                "bob",
                "v2.csv",
            )
            .unwrap();

        assert_eq!(report.merge.added, 1);
        assert_eq!(report.merge.removed, 1);
        assert_eq!(report.merge.preserved, 1);

        let orders: Vec<String> = repo
            .list_jobs(Department::Misc)
            .unwrap()
            .into_iter()
            .map(|j| j.process_order)
            .collect();
        assert_eq!(orders, vec!["B", "C", "D"]);
    }

    // ==========================================
    // 人工调整保护测试
    // ==========================================

    #[test]
    fn test_non_override_job_is_fully_overwritten() {
        let (repo, engine) = setup();
        engine
            .reconcile(Department::Milling, vec![row("PO-100", "M1", 1, 4.0, 1)], "a", "v1")
            .unwrap();

        let report = engine
            .reconcile(Department::Milling, vec![row("PO-100", "M2", 2, 3.0, 2)], "a", "v2")
            .unwrap();

        let job = repo.get_job(Department::Milling, "PO-100").unwrap().unwrap();
        assert_eq!(job.machine, "M2");
        assert_eq!(job.start_datetime, ts(2, 8));
        assert_eq!(job.duration_hours, 3.0);
        assert_eq!(job.priority, 2);
        assert!(!job.manual_override);
        assert_eq!(report.merge.updated, 1);
        assert_eq!(report.merge.preserved, 0);
    }

    #[test]
    fn test_override_job_keeps_schedule_fields() {
        let (repo, engine) = setup();
        engine
            .reconcile(Department::Milling, vec![row("PO-100", "M1", 1, 4.0, 1)], "a", "v1")
            .unwrap();
        mark_override(&repo, Department::Milling, "PO-100");

        let mut incoming = row("PO-100", "M2", 2, 3.0, 2);
        incoming.end_product = Some("Revised housing".to_string());
        let report = engine
            .reconcile(Department::Milling, vec![incoming], "a", "v2")
            .unwrap();

        let job = repo.get_job(Department::Milling, "PO-100").unwrap().unwrap();
        assert_eq!(job.machine, "M1");
        assert_eq!(job.start_datetime, ts(1, 8));
        assert_eq!(job.duration_hours, 4.0);
        assert_eq!(job.priority, 1);
        assert!(job.manual_override);
        assert_eq!(job.end_product.as_deref(), Some("Revised housing"));
        assert_eq!(report.merge.preserved, 1);
    }

    #[test]
    fn test_orphaned_override_removed_by_default() {
        let (repo, engine) = setup();
        engine
            .reconcile(Department::Turning, vec![row("A", "T1", 1, 1.0, 1), row("B", "T1", 1, 1.0, 1)], "a", "v1")
            .unwrap();
        mark_override(&repo, Department::Turning, "A");

        let report = engine
            .reconcile(Department::Turning, vec![row("B", "T1", 1, 1.0, 1)], "a", "v2")
            .unwrap();

        assert_eq!(report.merge.removed, 1);
        assert_eq!(report.merge.retained, 0);
        assert!(repo.get_job(Department::Turning, "A").unwrap().is_none());
    }

    #[test]
    fn test_orphaned_override_retained_by_policy() {
        let (repo, engine) = setup_with_policy(ReconcilePolicy {
            retain_orphaned_overrides: true,
        });
        engine
            .reconcile(Department::Turning, vec![row("A", "T1", 1, 1.0, 1), row("B", "T1", 1, 1.0, 1), row("C", "T1", 1, 1.0, 1)], "a", "v1")
            .unwrap();
        mark_override(&repo, Department::Turning, "A");

        let report = engine
            .reconcile(Department::Turning, vec![row("C", "T1", 1, 1.0, 1)], "a", "v2")
            .unwrap();

        assert_eq!(report.merge.retained, 1);
        assert_eq!(report.merge.removed, 1);
        assert!(repo.get_job(Department::Turning, "A").unwrap().is_some());
        assert!(repo.get_job(Department::Turning, "B").unwrap().is_none());
    }

    // ==========================================
    // 失败语义测试
    // ==========================================

    #[test]
    fn test_malformed_rows_are_skipped() {
        let (repo, engine) = setup();
        let report = engine
            .reconcile(
                Department::SlidingHead,
                vec![row("A", "S1", 1, 1.0, 1), row("", "S1", 1, 1.0, 1), row("C", "S1", 1, 0.0, 1)],
                "a",
                "v1",
            )
            .unwrap();

        assert_eq!(report.merge.added, 1);
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(repo.list_jobs(Department::SlidingHead).unwrap().len(), 1);
        assert_eq!(
            repo.latest_upload(Department::SlidingHead).unwrap().unwrap().skipped,
            2
        );
    }

    #[test]
    fn test_all_rows_invalid_is_rejected() {
        let (repo, engine) = setup();
        engine
            .reconcile(Department::Milling, vec![row("A", "M1", 1, 1.0, 1)], "a", "v1")
            .unwrap();

        let result = engine.reconcile(
            Department::Milling,
            vec![row("", "M1", 1, 1.0, 1)],
            "a",
            "broken.xlsx",
        );

        assert!(matches!(result, Err(ScheduleError::InvalidInput(_))));
        assert_eq!(repo.list_jobs(Department::Milling).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_upload_clears_department() {
        let (repo, engine) = setup();
        engine
            .reconcile(Department::Misc, vec![row("A", "X1", 1, 1.0, 1)], "a", "v1")
            .unwrap();

        let report = engine.reconcile(Department::Misc, vec![], "a", "empty.csv").unwrap();

        assert_eq!(report.merge.removed, 1);
        assert!(repo.list_jobs(Department::Misc).unwrap().is_empty());
    }

    /// 写入阶段总是失败的仓储
    struct FailingStore {
        inner: Arc<JobRepository>,
    }

    impl JobStore for FailingStore {
        fn list_jobs(&self, department: Department) -> RepositoryResult<Vec<Job>> {
            self.inner.list_jobs(department)
        }
        fn get_job(&self, department: Department, process_order: &str) -> RepositoryResult<Option<Job>> {
            self.inner.get_job(department, process_order)
        }
        fn upsert_jobs(&self, department: Department, jobs: &[Job]) -> RepositoryResult<usize> {
            self.inner.upsert_jobs(department, jobs)
        }
        fn delete_jobs(&self, department: Department, process_orders: &[String]) -> RepositoryResult<usize> {
            self.inner.delete_jobs(department, process_orders)
        }
        fn save_job(&self, job: &Job) -> RepositoryResult<Job> {
            self.inner.save_job(job)
        }
        fn apply_merge(&self, _department: Department, _batch: &MergeBatch) -> RepositoryResult<()> {
            Err(RepositoryError::DatabaseTransactionError("disk I/O error".to_string()))
        }
        fn latest_upload(&self, department: Department) -> RepositoryResult<Option<UploadRecord>> {
            self.inner.latest_upload(department)
        }
    }

    #[test]
    fn test_store_failure_is_surfaced_and_state_kept() {
        let (repo, engine) = setup();
        engine
            .reconcile(Department::Milling, vec![row("A", "M1", 1, 1.0, 1)], "a", "v1")
            .unwrap();

        let failing = ReconciliationEngine::new(
            Arc::new(FailingStore { inner: repo.clone() }),
            ReconcilePolicy::default(),
        );
        let result = failing.reconcile(Department::Milling, vec![row("B", "M1", 1, 1.0, 1)], "a", "v2");

        assert!(matches!(result, Err(ScheduleError::StoreUnavailable(_))));
        let jobs = repo.list_jobs(Department::Milling).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].process_order, "A");
    }

    #[test]
    fn test_plan_merge_is_pure_and_ordered() {
        let now = ts(1, 0);
        let current = vec![
            Job::from_row(Department::Milling, &row("Z", "M1", 1, 1.0, 1), now),
            Job::from_row(Department::Milling, &row("A", "M1", 1, 1.0, 1), now),
        ];

        let (batch, merge) = plan_merge(
            Department::Milling,
            current,
            vec![],
            ReconcilePolicy::default(),
            now,
        );

        assert_eq!(merge.removed, 2);
        let deleted: Vec<&str> = batch.deletes.iter().map(|(po, _)| po.as_str()).collect();
        assert_eq!(deleted, vec!["A", "Z"]);
    }
}
