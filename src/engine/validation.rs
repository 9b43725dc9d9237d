// ==========================================
// 生产产能排程系统 - 上传行校验
// ==========================================
// 职责: 排程表行进入对账前的边界校验
// 规则:
// - process_order / machine 非空
// - duration_hours 为有限正数，不超过工时上限，结束时间可表示
// - start_datetime 截断到整秒（存储精度）
// - 同一上传内 process_order 重复时保留首行
// 红线: 校验失败只跳过该行，不中断车间对账
// ==========================================

use crate::domain::job::{schedule_end, to_storage_precision, JobRow, MAX_DURATION_HOURS};
use crate::domain::merge::RowIssue;
use std::collections::HashSet;

/// 校验通过的行: (原始行号, 规整后的行)
pub type ValidRow = (usize, JobRow);

/// 行校验器（无状态）
pub struct RowValidator;

impl RowValidator {
    /// 校验并规整上传行
    ///
    /// # 返回
    /// (有效行列表, 跳过的行问题列表)，有效行保持输入顺序
    pub fn validate(rows: Vec<JobRow>) -> (Vec<ValidRow>, Vec<RowIssue>) {
        let mut valid = Vec::with_capacity(rows.len());
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (row_index, row) in rows.into_iter().enumerate() {
            let row = Self::normalize(row);

            if let Some(reason) = Self::check_row(&row) {
                issues.push(RowIssue::new(row_index, Some(&row.process_order), reason));
                continue;
            }

            if !seen.insert(row.process_order.clone()) {
                issues.push(RowIssue::new(
                    row_index,
                    Some(&row.process_order),
                    "工单号在本次上传中重复，已保留首行",
                ));
                continue;
            }

            valid.push((row_index, row));
        }

        (valid, issues)
    }

    /// 单行规则校验，返回失败原因
    fn check_row(row: &JobRow) -> Option<String> {
        if row.process_order.is_empty() {
            return Some("工单号缺失".to_string());
        }
        if row.machine.is_empty() {
            return Some("机台缺失".to_string());
        }
        if !row.duration_hours.is_finite() || row.duration_hours <= 0.0 {
            return Some(format!("工时必须为正数: {}", row.duration_hours));
        }
        if row.duration_hours > MAX_DURATION_HOURS {
            return Some(format!(
                "工时超出上限{}小时: {}",
                MAX_DURATION_HOURS, row.duration_hours
            ));
        }
        if schedule_end(row.start_datetime, row.duration_hours).is_none() {
            return Some(format!("结束时间超出日期范围: {}", row.start_datetime));
        }
        None
    }

    /// 去除首尾空白，空成品描述视为 None，空状态标记丢弃，开始时间截断到整秒
    fn normalize(mut row: JobRow) -> JobRow {
        row.start_datetime = to_storage_precision(row.start_datetime);
        row.process_order = row.process_order.trim().to_string();
        row.machine = row.machine.trim().to_string();
        row.end_product = row
            .end_product
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        row.status_flags = row
            .status_flags
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn row(process_order: &str, machine: &str, duration_hours: f64) -> JobRow {
        JobRow {
            process_order: process_order.to_string(),
            machine: machine.to_string(),
            start_datetime: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            duration_hours,
            priority: 1,
            end_product: None,
            status_flags: vec![],
        }
    }

    #[test]
    fn test_rejects_missing_keys_and_bad_duration() {
        let rows = vec![
            row("  ", "M1", 1.0),
            row("PO-1", "", 1.0),
            row("PO-2", "M1", 0.0),
            row("PO-3", "M1", -2.0),
            row("PO-4", "M1", f64::NAN),
            row("PO-5", "M1", 1.5),
        ];

        let (valid, issues) = RowValidator::validate(rows);

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].0, 5);
        assert_eq!(issues.len(), 5);
        assert_eq!(issues[0].process_order, None);
        assert_eq!(issues[2].process_order.as_deref(), Some("PO-2"));
    }

    #[test]
    fn test_rejects_durations_past_cap_or_date_range() {
        let mut late_start = row("PO-3", "M1", 2.0);
        late_start.start_datetime = NaiveDateTime::MAX;

        let rows = vec![
            row("PO-1", "M1", 1e10),
            row("PO-2", "M1", MAX_DURATION_HOURS + 1.0),
            late_start,
            row("PO-4", "M1", MAX_DURATION_HOURS),
        ];

        let (valid, issues) = RowValidator::validate(rows);

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].1.process_order, "PO-4");
        let rejected: Vec<usize> = issues.iter().map(|i| i.row_index).collect();
        assert_eq!(rejected, vec![0, 1, 2]);
    }

    #[test]
    fn test_subsecond_start_truncated_to_whole_seconds() {
        let mut input = row("PO-1", "M1", 1.0);
        let whole = input.start_datetime;
        input.start_datetime = whole + chrono::Duration::milliseconds(500);

        let (valid, _) = RowValidator::validate(vec![input]);

        assert_eq!(valid[0].1.start_datetime, whole);
    }

    #[test]
    fn test_duplicate_process_order_keeps_first() {
        let rows = vec![row("PO-1", "M1", 1.0), row(" PO-1 ", "M2", 2.0)];

        let (valid, issues) = RowValidator::validate(rows);

        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].1.machine, "M1");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].row_index, 1);
    }

    #[test]
    fn test_normalizes_whitespace_and_empty_descriptive() {
        let mut input = row(" PO-9 ", " M3 ", 2.0);
        input.end_product = Some("   ".to_string());
        input.status_flags = vec![" HOLD ".to_string(), "".to_string()];

        let (valid, _) = RowValidator::validate(vec![input]);
        let normalized = &valid[0].1;

        assert_eq!(normalized.process_order, "PO-9");
        assert_eq!(normalized.machine, "M3");
        assert_eq!(normalized.end_product, None);
        assert_eq!(normalized.status_flags, vec!["HOLD".to_string()]);
    }
}
