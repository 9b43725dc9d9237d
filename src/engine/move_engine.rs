// ==========================================
// 生产产能排程系统 - 人工调整引擎
// ==========================================
// 职责: 校验并应用单个作业的人工改派（机台/开始/工时/优先级）
// 输出: 更新后的作业（manual_override=true + 调整溯源）
// ==========================================
// 红线: 只能调整已存在的作业，不隐式创建
// 红线: 同一 (车间, 工单号) 的调整串行执行
// 说明: 不做重叠检测，重叠由产能聚合标记展示
// ==========================================

use crate::domain::job::{schedule_end, to_storage_precision, Job, MAX_DURATION_HOURS};
use crate::domain::types::Department;
use crate::engine::error::{ScheduleError, ScheduleResult};
use crate::engine::policy::MovePolicy;
use crate::repository::job_repo::JobStore;
use crate::repository::machine_repo::ResourceRegistry;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// 人工调整请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub department: Department,
    pub process_order: String,
    pub to_machine: String,
    pub new_duration_hours: f64,
    pub new_start: NaiveDateTime,
    pub new_priority: i32,
    pub moved_by: String,
    pub reason: Option<String>,
}

type KeyLock = Arc<Mutex<()>>;

// ==========================================
// MoveEngine - 人工调整引擎
// ==========================================
pub struct MoveEngine {
    store: Arc<dyn JobStore>,
    registry: Arc<dyn ResourceRegistry>,
    policy: MovePolicy,
    key_locks: Mutex<HashMap<(Department, String), KeyLock>>,
}

impl MoveEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<dyn ResourceRegistry>,
        policy: MovePolicy,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 获取 (车间, 工单号) 粒度的锁
    fn key_lock(&self, department: Department, process_order: &str) -> ScheduleResult<KeyLock> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|e| ScheduleError::StoreUnavailable(format!("调整锁获取失败: {}", e)))?;

        // 只剩 map 自身持有的锁可以回收，避免长期运行后无限增长
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Ok(locks
            .entry((department, process_order.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 人工改派作业
    ///
    /// # 错误
    /// - InvalidInput: 工时非正数或超出上限 / 目标机台为空 / 严格模式下机台未登记或停用
    /// - NotFound: 作业不存在（先于目标机台校验）
    /// - ConflictingWrite: 保存时作业已被其他进程修改
    pub fn move_job(&self, request: MoveRequest) -> ScheduleResult<Job> {
        self.move_job_with_policy(request, self.policy)
    }

    /// 按指定策略改派（策略来自运行时配置时使用）
    #[instrument(skip(self, request), fields(
        department = %request.department,
        process_order = %request.process_order,
        to_machine = %request.to_machine,
        strict = policy.strict_machine_check
    ))]
    pub fn move_job_with_policy(
        &self,
        request: MoveRequest,
        policy: MovePolicy,
    ) -> ScheduleResult<Job> {
        let process_order = request.process_order.trim();
        let to_machine = request.to_machine.trim();

        // 参数验证
        if process_order.is_empty() {
            return Err(ScheduleError::InvalidInput("工单号不能为空".to_string()));
        }
        if to_machine.is_empty() {
            return Err(ScheduleError::InvalidInput("目标机台不能为空".to_string()));
        }
        if !request.new_duration_hours.is_finite() || request.new_duration_hours <= 0.0 {
            return Err(ScheduleError::InvalidInput(format!(
                "工时必须为正数: {}",
                request.new_duration_hours
            )));
        }
        if request.new_duration_hours > MAX_DURATION_HOURS {
            return Err(ScheduleError::InvalidInput(format!(
                "工时超出上限{}小时: {}",
                MAX_DURATION_HOURS, request.new_duration_hours
            )));
        }
        let new_start = to_storage_precision(request.new_start);
        if schedule_end(new_start, request.new_duration_hours).is_none() {
            return Err(ScheduleError::InvalidInput(format!(
                "结束时间超出日期范围: {}",
                new_start
            )));
        }

        let lock = self.key_lock(request.department, process_order)?;
        let _guard = lock
            .lock()
            .map_err(|e| ScheduleError::StoreUnavailable(format!("调整锁获取失败: {}", e)))?;

        let mut job = self
            .store
            .get_job(request.department, process_order)?
            .ok_or_else(|| {
                ScheduleError::NotFound(format!(
                    "{}车间作业{}不存在",
                    request.department, process_order
                ))
            })?;

        self.check_destination(request.department, to_machine, policy)?;

        let from_machine = job.machine.clone();
        let now = chrono::Local::now().naive_local();
        let actor = if request.moved_by.trim().is_empty() {
            "system"
        } else {
            request.moved_by.trim()
        };

        job.machine = to_machine.to_string();
        job.start_datetime = new_start;
        job.duration_hours = request.new_duration_hours;
        job.priority = request.new_priority;
        job.manual_override = true;
        job.moved_by = Some(actor.to_string());
        job.moved_at = Some(now);
        job.override_reason = request
            .reason
            .as_ref()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        job.updated_at = now;

        let saved = self.store.save_job(&job)?;

        info!(
            from_machine = %from_machine,
            moved_by = actor,
            revision = saved.revision,
            "作业已人工改派"
        );
        Ok(saved)
    }

    /// 解除人工调整保护，下一次上传将重新覆盖排程字段
    #[instrument(skip(self))]
    pub fn release_override(
        &self,
        department: Department,
        process_order: &str,
        released_by: &str,
    ) -> ScheduleResult<Job> {
        let process_order = process_order.trim();
        let lock = self.key_lock(department, process_order)?;
        let _guard = lock
            .lock()
            .map_err(|e| ScheduleError::StoreUnavailable(format!("调整锁获取失败: {}", e)))?;

        let mut job = self.store.get_job(department, process_order)?.ok_or_else(|| {
            ScheduleError::NotFound(format!("{}车间作业{}不存在", department, process_order))
        })?;

        if !job.manual_override {
            return Ok(job);
        }

        job.manual_override = false;
        job.override_reason = None;
        job.moved_by = None;
        job.moved_at = None;
        job.updated_at = chrono::Local::now().naive_local();

        let saved = self.store.save_job(&job)?;
        info!(released_by, "已解除人工调整保护");
        Ok(saved)
    }

    /// 目标机台校验（默认仅告警，严格模式拒绝）
    fn check_destination(
        &self,
        department: Department,
        to_machine: &str,
        policy: MovePolicy,
    ) -> ScheduleResult<()> {
        let machines = self.registry.list_machines(department)?;
        let problem = match machines.iter().find(|m| m.name == to_machine) {
            None => Some(format!("机台{}未在{}车间登记", to_machine, department)),
            Some(m) if !m.is_active => Some(format!("机台{}已停用", to_machine)),
            Some(_) => None,
        };

        match problem {
            Some(reason) if policy.strict_machine_check => {
                Err(ScheduleError::InvalidInput(reason))
            }
            Some(reason) => {
                warn!(%reason, "目标机台不在登记表中，按宽松策略继续");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
