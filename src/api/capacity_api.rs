// ==========================================
// 生产产能排程系统 - 产能排程 API
// ==========================================
// 职责: 上传对账 / 产能快照 / 人工调整 / 机台登记
// 说明: 多车间上传并行对账，每个车间独立事务
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::PolicyConfigReader;
use crate::domain::capacity::CapacitySnapshot;
use crate::domain::job::{Job, JobRow};
use crate::domain::machine::Machine;
use crate::domain::merge::{MergeResult, ReconcileReport, RowIssue, UploadRecord};
use crate::domain::types::Department;
use crate::engine::{CapacityAggregator, MoveEngine, MoveRequest, ReconciliationEngine};
use crate::importer::ScheduleImporter;
use crate::repository::job_repo::JobStore;
use crate::repository::machine_repo::{MachineRepository, ResourceRegistry};
use crate::repository::upload_log_repo::UploadLogRepository;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ==========================================
// 响应类型
// ==========================================

/// 单车间对账结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentOutcome {
    pub department: Department,
    /// 对账报告（成功时）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconcileReport>,
    /// 失败原因（失败时，该车间数据未改动）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DepartmentOutcome {
    pub fn succeeded(&self) -> bool {
        self.report.is_some()
    }
}

/// 上传汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub file_name: String,
    pub uploaded_by: String,
    /// 成功车间的合并计数之和
    pub totals: MergeResult,
    /// 跳过的行数（含无法归属车间的行）
    pub skipped: usize,
    pub outcomes: Vec<DepartmentOutcome>,
    /// 无法归属车间的问题行
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unassigned_issues: Vec<RowIssue>,
    /// 面向用户的一句话汇总
    pub message: String,
}

impl UploadSummary {
    fn build(
        file_name: &str,
        uploaded_by: &str,
        outcomes: Vec<DepartmentOutcome>,
        unassigned_issues: Vec<RowIssue>,
    ) -> Self {
        let mut totals = MergeResult::default();
        let mut skipped = unassigned_issues.len();
        for report in outcomes.iter().filter_map(|o| o.report.as_ref()) {
            totals += report.merge;
            skipped += report.skipped_count();
        }
        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();

        let mut message = format!(
            "{} added, {} removed, {} manual moves preserved",
            totals.added, totals.removed, totals.preserved
        );
        if totals.retained > 0 {
            message.push_str(&format!(", {} orphaned moves retained", totals.retained));
        }
        if skipped > 0 {
            message.push_str(&format!(", {} rows skipped", skipped));
        }
        if failed > 0 {
            message.push_str(&format!(", {} department(s) failed", failed));
        }

        Self {
            file_name: file_name.to_string(),
            uploaded_by: uploaded_by.to_string(),
            totals,
            skipped,
            outcomes,
            unassigned_issues,
            message,
        }
    }

    pub fn outcome(&self, department: Department) -> Option<&DepartmentOutcome> {
        self.outcomes.iter().find(|o| o.department == department)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(DepartmentOutcome::succeeded)
    }
}

// ==========================================
// CapacityApi
// ==========================================
pub struct CapacityApi {
    job_store: Arc<dyn JobStore>,
    machine_repo: Arc<MachineRepository>,
    upload_log_repo: Arc<UploadLogRepository>,
    policy_reader: Arc<dyn PolicyConfigReader>,
    aggregator: CapacityAggregator,
    move_engine: Arc<MoveEngine>,
}

impl CapacityApi {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        machine_repo: Arc<MachineRepository>,
        upload_log_repo: Arc<UploadLogRepository>,
        policy_reader: Arc<dyn PolicyConfigReader>,
    ) -> Self {
        let registry: Arc<dyn ResourceRegistry> = machine_repo.clone();

        Self {
            aggregator: CapacityAggregator::new(job_store.clone(), registry.clone()),
            // 策略在每次调用时从配置读取
            move_engine: Arc::new(MoveEngine::new(
                job_store.clone(),
                registry,
                Default::default(),
            )),
            job_store,
            machine_repo,
            upload_log_repo,
            policy_reader,
        }
    }

    // ==========================================
    // 上传对账
    // ==========================================

    /// 上传排程（多车间并行对账）
    ///
    /// # 参数
    /// - rows_by_department: 各车间的完整排程行
    /// - uploaded_by: 上传人
    /// - file_name: 来源文件名
    ///
    /// # 返回
    /// 单个车间失败不影响其他车间，失败原因写入对应 outcome。
    #[instrument(skip(self, rows_by_department), fields(departments = rows_by_department.len()))]
    pub async fn upload_schedule(
        &self,
        rows_by_department: HashMap<Department, Vec<JobRow>>,
        uploaded_by: &str,
        file_name: &str,
    ) -> ApiResult<UploadSummary> {
        let outcomes = self.reconcile_all(rows_by_department, uploaded_by, file_name).await?;
        let summary = UploadSummary::build(file_name, uploaded_by, outcomes, Vec::new());
        info!(message = %summary.message, "排程上传完成");
        Ok(summary)
    }

    /// 上传排程文件（.csv / .xlsx）
    ///
    /// # 参数
    /// - path: 文件路径
    /// - department: 文件无车间列时的目标车间
    /// - uploaded_by: 上传人
    #[instrument(skip(self, path), fields(file = %path.as_ref().display()))]
    pub async fn upload_file<P: AsRef<Path>>(
        &self,
        path: P,
        department: Option<Department>,
        uploaded_by: &str,
    ) -> ApiResult<UploadSummary> {
        let path_buf: PathBuf = path.as_ref().to_path_buf();
        let file_name = path_buf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_buf.display().to_string());

        let mapped = tokio::task::spawn_blocking(move || {
            ScheduleImporter::new().import_file(&path_buf, department)
        })
        .await??;

        let outcomes = self
            .reconcile_all(mapped.rows_by_department.clone(), uploaded_by, &file_name)
            .await?;

        // 车间内行号换算为文件行号，并并入映射阶段的问题行
        let mut unassigned = Vec::new();
        let mut mapping_issues: HashMap<Department, Vec<RowIssue>> = HashMap::new();
        for (dept, issue) in mapped.issues.iter().cloned() {
            match dept {
                Some(d) => mapping_issues.entry(d).or_default().push(issue),
                None => unassigned.push(issue),
            }
        }

        let mut outcomes = outcomes;
        for outcome in outcomes.iter_mut() {
            let extra = mapping_issues.remove(&outcome.department).unwrap_or_default();
            match outcome.report.as_mut() {
                Some(report) => {
                    for issue in report.skipped.iter_mut() {
                        if let Some(file_row) = mapped.file_row(outcome.department, issue.row_index)
                        {
                            issue.row_index = file_row;
                        }
                    }
                    report.skipped.extend(extra);
                    report.skipped.sort_by_key(|i| i.row_index);
                }
                None => unassigned.extend(extra),
            }
        }
        // 映射问题所属车间没有任何有效行时不参与对账
        for (_, issues) in mapping_issues {
            unassigned.extend(issues);
        }
        unassigned.sort_by_key(|i| i.row_index);

        let summary = UploadSummary::build(&file_name, uploaded_by, outcomes, unassigned);
        info!(message = %summary.message, "排程文件上传完成");
        Ok(summary)
    }

    /// 并行对账（每个车间一个阻塞任务）
    async fn reconcile_all(
        &self,
        rows_by_department: HashMap<Department, Vec<JobRow>>,
        uploaded_by: &str,
        file_name: &str,
    ) -> ApiResult<Vec<DepartmentOutcome>> {
        let policy = self.policy_reader.get_reconcile_policy().await?;
        let engine = Arc::new(ReconciliationEngine::new(self.job_store.clone(), policy));

        // 固定车间顺序，保证汇总输出确定
        let mut batches: Vec<(Department, Vec<JobRow>)> = rows_by_department.into_iter().collect();
        batches.sort_by_key(|(dept, _)| *dept);

        let tasks = batches.into_iter().map(|(dept, rows)| {
            let engine = engine.clone();
            let uploaded_by = uploaded_by.to_string();
            let file_name = file_name.to_string();
            async move {
                let joined = tokio::task::spawn_blocking(move || {
                    engine.reconcile(dept, rows, &uploaded_by, &file_name)
                })
                .await;

                match joined {
                    Ok(Ok(report)) => DepartmentOutcome {
                        department: dept,
                        report: Some(report),
                        error: None,
                    },
                    Ok(Err(e)) => {
                        warn!(department = %dept, error = %e, "车间对账失败");
                        DepartmentOutcome {
                            department: dept,
                            report: None,
                            error: Some(e.to_string()),
                        }
                    }
                    Err(e) => DepartmentOutcome {
                        department: dept,
                        report: None,
                        error: Some(ApiError::from(e).to_string()),
                    },
                }
            }
        });

        Ok(join_all(tasks).await)
    }

    // ==========================================
    // 产能快照
    // ==========================================

    /// 车间产能快照
    pub fn capacity_snapshot(&self, department: Department) -> ApiResult<CapacitySnapshot> {
        Ok(self.aggregator.snapshot(department)?)
    }

    /// 车间当前作业
    pub fn list_jobs(&self, department: Department) -> ApiResult<Vec<Job>> {
        Ok(self.job_store.list_jobs(department)?)
    }

    /// 车间上传历史
    pub fn upload_history(
        &self,
        department: Department,
        limit: usize,
    ) -> ApiResult<Vec<UploadRecord>> {
        Ok(self.upload_log_repo.list_by_department(department, limit)?)
    }

    // ==========================================
    // 人工调整
    // ==========================================

    /// 人工改派
    pub async fn move_job(&self, request: MoveRequest) -> ApiResult<Job> {
        let policy = self.policy_reader.get_move_policy().await?;
        let engine = self.move_engine.clone();

        let job = tokio::task::spawn_blocking(move || engine.move_job_with_policy(request, policy))
            .await??;
        Ok(job)
    }

    /// 解除人工调整保护
    pub fn release_override(
        &self,
        department: Department,
        process_order: &str,
        released_by: &str,
    ) -> ApiResult<Job> {
        Ok(self
            .move_engine
            .release_override(department, process_order, released_by)?)
    }

    // ==========================================
    // 机台登记
    // ==========================================

    pub fn list_machines(&self, department: Department) -> ApiResult<Vec<Machine>> {
        Ok(self.machine_repo.list_machines(department)?)
    }

    /// 登记或更新机台
    pub fn register_machine(
        &self,
        department: Department,
        name: &str,
        is_active: bool,
        description: Option<String>,
    ) -> ApiResult<Machine> {
        let mut machine = Machine::new(department, name);
        machine.is_active = is_active;
        machine.description = description;

        self.machine_repo.upsert_machine(&machine)?;
        info!(department = %department, machine = %machine.name, is_active, "机台已登记");
        Ok(machine)
    }

    pub fn set_machine_active(
        &self,
        department: Department,
        name: &str,
        is_active: bool,
    ) -> ApiResult<()> {
        Ok(self.machine_repo.set_active(department, name.trim(), is_active)?)
    }
}
