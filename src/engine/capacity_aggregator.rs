// ==========================================
// 生产产能排程系统 - 产能聚合引擎
// ==========================================
// 职责: 按车间派生机台负荷汇总与甘特图时间段
// 输入: 车间作业 + 机台登记 + 最近上传记录
// 输出: CapacitySnapshot (不落库)
// ==========================================
// 红线: 只读计算，不修改作业仓储
// 红线: 相同数据多次调用输出完全一致
//       (开始时间 ↑, 优先级 ↑, 工单号 ↑)
// ==========================================

use crate::domain::capacity::{CapacitySnapshot, GanttSegment, MachineSummary};
use crate::domain::job::Job;
use crate::domain::machine::Machine;
use crate::domain::merge::UploadRecord;
use crate::domain::types::Department;
use crate::engine::error::ScheduleResult;
use crate::repository::job_repo::JobStore;
use crate::repository::machine_repo::ResourceRegistry;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

// ==========================================
// CapacityAggregator - 产能聚合引擎
// ==========================================
pub struct CapacityAggregator {
    store: Arc<dyn JobStore>,
    registry: Arc<dyn ResourceRegistry>,
}

impl CapacityAggregator {
    pub fn new(store: Arc<dyn JobStore>, registry: Arc<dyn ResourceRegistry>) -> Self {
        Self { store, registry }
    }

    /// 生成车间产能快照
    ///
    /// 作业列表由一次查询读取，因此只会观察到对账前或对账后的完整状态
    #[instrument(skip(self), fields(department = %department))]
    pub fn snapshot(&self, department: Department) -> ScheduleResult<CapacitySnapshot> {
        let machines = self.registry.list_machines(department)?;
        let jobs = self.store.list_jobs(department)?;
        let last_upload = self.store.latest_upload(department)?;
        let now = chrono::Local::now().naive_local();

        let snapshot = build_snapshot(department, machines, jobs, last_upload, now);
        debug!(
            machines = snapshot.machines.len(),
            segments = snapshot.segments.len(),
            "产能快照已生成"
        );
        Ok(snapshot)
    }
}

/// 按确定性顺序生成甘特图时间段
///
/// 排序: 开始时间 ↑ → 优先级 ↑ → 工单号 ↑；
/// 同机台中开始早于此前最晚结束的段标记为重叠
pub fn build_segments(jobs: &[Job]) -> Vec<GanttSegment> {
    let mut segments: Vec<GanttSegment> = jobs
        .iter()
        .map(|job| GanttSegment {
            machine: job.machine.clone(),
            process_order: job.process_order.clone(),
            start: job.start_datetime,
            end: job.end_datetime().unwrap_or_else(|| {
                warn!(
                    process_order = %job.process_order,
                    duration_hours = job.duration_hours,
                    "作业结束时间超出日期范围，按最大时间展示"
                );
                NaiveDateTime::MAX
            }),
            priority: job.priority,
            manual_override: job.manual_override,
            overlaps_previous: false,
        })
        .collect();

    segments.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| a.process_order.cmp(&b.process_order))
    });

    let mut machine_busy_until: HashMap<String, NaiveDateTime> = HashMap::new();
    for segment in segments.iter_mut() {
        match machine_busy_until.get_mut(&segment.machine) {
            Some(busy_until) => {
                segment.overlaps_previous = segment.start < *busy_until;
                if segment.end > *busy_until {
                    *busy_until = segment.end;
                }
            }
            None => {
                machine_busy_until.insert(segment.machine.clone(), segment.end);
            }
        }
    }

    segments
}

/// 组装产能快照（纯函数）
pub fn build_snapshot(
    department: Department,
    machines: Vec<Machine>,
    jobs: Vec<Job>,
    last_upload: Option<UploadRecord>,
    generated_at: NaiveDateTime,
) -> CapacitySnapshot {
    let segments = build_segments(&jobs);

    let horizon_start = segments.iter().map(|s| s.start).min();
    let horizon_end = segments.iter().map(|s| s.end).max();
    let horizon_hours = match (horizon_start, horizon_end) {
        (Some(start), Some(end)) => (end - start).num_seconds() as f64 / 3600.0,
        _ => 0.0,
    };

    // 按机台累计（BTreeMap 保证未登记机台按名称有序）
    let mut per_machine: BTreeMap<String, MachineSummary> = BTreeMap::new();
    for segment in &segments {
        let summary = per_machine
            .entry(segment.machine.clone())
            .or_insert_with(|| empty_summary(&segment.machine, true, false));

        summary.job_count += 1;
        summary.scheduled_hours += (segment.end - segment.start).num_seconds() as f64 / 3600.0;
        if segment.overlaps_previous {
            summary.overlap_count += 1;
        }
        summary.first_start = Some(match summary.first_start {
            Some(first) => first.min(segment.start),
            None => segment.start,
        });
        summary.next_free_at = Some(match summary.next_free_at {
            Some(free) => free.max(segment.end),
            None => segment.end,
        });
    }

    // 登记机台在前（按名称），包括无作业的空闲机台
    let mut registered: Vec<Machine> = machines;
    registered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut summaries = Vec::with_capacity(registered.len() + per_machine.len());
    for machine in registered {
        let mut summary = per_machine
            .remove(&machine.name)
            .unwrap_or_else(|| empty_summary(&machine.name, machine.is_active, true));
        summary.is_active = machine.is_active;
        summary.registered = true;
        summaries.push(summary);
    }
    // 作业引用但未登记的机台
    summaries.extend(per_machine.into_values());

    for summary in summaries.iter_mut() {
        summary.utilization_pct = if horizon_hours > 0.0 {
            summary.scheduled_hours / horizon_hours * 100.0
        } else {
            0.0
        };
    }

    CapacitySnapshot {
        department,
        machines: summaries,
        jobs,
        segments,
        last_upload,
        horizon_start,
        horizon_end,
        generated_at,
    }
}

fn empty_summary(machine: &str, is_active: bool, registered: bool) -> MachineSummary {
    MachineSummary {
        machine: machine.to_string(),
        is_active,
        registered,
        job_count: 0,
        scheduled_hours: 0.0,
        first_start: None,
        next_free_at: None,
        utilization_pct: 0.0,
        overlap_count: 0,
    }
}
