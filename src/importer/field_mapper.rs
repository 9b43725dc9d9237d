// ==========================================
// 生产产能排程系统 - 字段映射器实现
// ==========================================
// 职责: 排程表表头 → JobRow 字段映射 + 类型转换
// 说明: 表头匹配不区分大小写，支持常见别名
// ==========================================

use crate::domain::job::JobRow;
use crate::domain::merge::RowIssue;
use crate::domain::types::Department;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::schedule_importer_trait::{FieldMapper, RawRecord};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::warn;

// ==========================================
// 表头别名
// ==========================================
const PROCESS_ORDER: &[&str] = &[
    "process order",
    "process_order",
    "po",
    "works order",
    "process order no",
    "工单号",
];
const MACHINE: &[&str] = &["machine", "machine name", "resource", "机台"];
const START: &[&str] = &[
    "start",
    "start date",
    "start time",
    "start datetime",
    "start_datetime",
    "开始时间",
];
const DURATION: &[&str] = &[
    "duration",
    "hours",
    "duration hours",
    "duration_hours",
    "run hours",
    "工时",
];
const PRIORITY: &[&str] = &["priority", "优先级"];
const END_PRODUCT: &[&str] = &["end product", "end_product", "part", "part number", "product", "产品"];
const STATUS_FLAGS: &[&str] = &["status", "flags", "status flags", "status_flags", "状态"];
const DEPARTMENT: &[&str] = &["department", "dept", "车间"];

// 支持的日期时间格式（按顺序尝试）
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

// Excel 序列号日期范围（1900-01-01 .. 9999-12-31）
const EXCEL_SERIAL_MIN: f64 = 1.0;
const EXCEL_SERIAL_MAX: f64 = 2_958_465.0;

/// 按车间拆分后的映射结果
#[derive(Debug, Default)]
pub struct MappedSchedule {
    pub rows_by_department: HashMap<Department, Vec<JobRow>>,
    // 与 rows_by_department 一一对应的文件行号
    pub source_rows: HashMap<Department, Vec<usize>>,
    pub issues: Vec<(Option<Department>, RowIssue)>,
}

impl MappedSchedule {
    pub fn row_count(&self) -> usize {
        self.rows_by_department.values().map(Vec::len).sum()
    }

    /// 车间内行号 → 文件行号
    pub fn file_row(&self, department: Department, department_row: usize) -> Option<usize> {
        self.source_rows
            .get(&department)
            .and_then(|rows| rows.get(department_row))
            .copied()
    }
}

// ==========================================
// ScheduleFieldMapper
// ==========================================
pub struct ScheduleFieldMapper;

impl FieldMapper for ScheduleFieldMapper {
    fn map_to_job_row(
        &self,
        row: &RawRecord,
        row_index: usize,
    ) -> ImportResult<(Option<Department>, JobRow)> {
        let row = normalize_keys(row);

        let department = match get_string(&row, DEPARTMENT) {
            None => None,
            Some(value) => Some(Department::parse(&value).ok_or(
                ImportError::UnknownDepartment {
                    row: row_index,
                    value,
                },
            )?),
        };

        let start_datetime = match get_string(&row, START) {
            Some(value) => parse_datetime(&value, row_index)?,
            None => {
                return Err(ImportError::MissingField {
                    row: row_index,
                    field: "Start".to_string(),
                })
            }
        };

        let duration_hours = match get_string(&row, DURATION) {
            Some(value) => parse_f64(&value, "Duration", row_index)?,
            None => {
                return Err(ImportError::MissingField {
                    row: row_index,
                    field: "Duration".to_string(),
                })
            }
        };

        // 优先级缺省为 0
        let priority = match get_string(&row, PRIORITY) {
            Some(value) => parse_priority(&value, row_index)?,
            None => 0,
        };

        let status_flags = get_string(&row, STATUS_FLAGS)
            .map(|v| split_flags(&v))
            .unwrap_or_default();

        // 工单号/机台为空交给行校验处理，以便进入对账报告
        let job_row = JobRow {
            process_order: get_string(&row, PROCESS_ORDER).unwrap_or_default(),
            machine: get_string(&row, MACHINE).unwrap_or_default(),
            start_datetime,
            duration_hours,
            priority,
            end_product: get_string(&row, END_PRODUCT),
            status_flags,
        };

        Ok((department, job_row))
    }
}

impl ScheduleFieldMapper {
    /// 批量映射并按车间拆分
    ///
    /// # 参数
    /// - records: 原始记录
    /// - default_department: 行内无车间列时使用的车间
    ///
    /// # 返回
    /// 映射失败的行记为 RowIssue，不中断整体导入。
    /// 指定了默认车间且文件为空时，返回该车间的空行集（清空该车间）。
    pub fn map_records(
        &self,
        records: &[RawRecord],
        default_department: Option<Department>,
    ) -> MappedSchedule {
        let mut mapped = MappedSchedule::default();

        if records.is_empty() {
            if let Some(dept) = default_department {
                mapped.rows_by_department.insert(dept, Vec::new());
                mapped.source_rows.insert(dept, Vec::new());
            }
            return mapped;
        }

        for (row_index, record) in records.iter().enumerate() {
            let normalized = normalize_keys(record);
            let po_hint = get_string(&normalized, PROCESS_ORDER);
            // 映射失败的行仍尽量归属到所在车间
            let dept_hint = get_string(&normalized, DEPARTMENT)
                .and_then(|v| Department::parse(&v))
                .or(default_department);

            match self.map_to_job_row(record, row_index) {
                Ok((row_dept, job_row)) => match row_dept.or(default_department) {
                    Some(dept) => {
                        mapped.rows_by_department.entry(dept).or_default().push(job_row);
                        mapped.source_rows.entry(dept).or_default().push(row_index);
                    }
                    None => mapped.issues.push((
                        None,
                        RowIssue::new(row_index, po_hint.as_deref(), "未指定车间"),
                    )),
                },
                Err(e) => {
                    warn!(row_index, error = %e, "排程行映射失败，已跳过");
                    mapped.issues.push((
                        dept_hint,
                        RowIssue::new(row_index, po_hint.as_deref(), e.to_string()),
                    ));
                }
            }
        }

        mapped
    }
}

// ==========================================
// 解析辅助函数
// ==========================================

/// 表头统一为小写去空白
fn normalize_keys(row: &RawRecord) -> HashMap<String, &str> {
    row.iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.as_str()))
        .collect()
}

/// 按别名提取非空字符串
fn get_string(row: &HashMap<String, &str>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| row.get(*alias))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_f64(value: &str, field: &str, row_index: usize) -> ImportResult<f64> {
    value
        .parse::<f64>()
        .map_err(|_| ImportError::TypeConversionError {
            row: row_index,
            field: field.to_string(),
            message: format!("无法解析为数值: {}", value),
        })
}

/// 优先级: 整数，兼容 Excel 输出的 "3.0"
fn parse_priority(value: &str, row_index: usize) -> ImportResult<i32> {
    if let Ok(p) = value.parse::<i32>() {
        return Ok(p);
    }

    let as_float = parse_f64(value, "Priority", row_index)?;
    if as_float.fract() == 0.0 && as_float.abs() <= i32::MAX as f64 {
        Ok(as_float as i32)
    } else {
        Err(ImportError::TypeConversionError {
            row: row_index,
            field: "Priority".to_string(),
            message: format!("优先级必须为整数: {}", value),
        })
    }
}

/// 解析开始时间: 文本格式 / 纯日期 / Excel 序列号
pub fn parse_datetime(value: &str, row_index: usize) -> ImportResult<NaiveDateTime> {
    let value = value.trim();

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(dt);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(dt);
            }
        }
    }

    if let Ok(serial) = value.parse::<f64>() {
        if let Some(dt) = excel_serial_to_datetime(serial) {
            return Ok(dt);
        }
    }

    Err(ImportError::DateFormatError {
        row: row_index,
        field: "Start".to_string(),
        value: value.to_string(),
    })
}

/// Excel 序列号 → 日期时间（基准 1899-12-30，精确到秒）
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !(EXCEL_SERIAL_MIN..=EXCEL_SERIAL_MAX).contains(&serial) {
        return None;
    }

    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    base.checked_add_signed(chrono::Duration::seconds(seconds))
}

/// 状态标记: 逗号/分号/竖线分隔
fn split_flags(value: &str) -> Vec<String> {
    value
        .split([',', ';', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_map_basic_row_with_aliases() {
        let row = record(&[
            ("Works Order", " PO-100 "),
            ("MACHINE", "M1"),
            ("Start Date", "2024-01-05 08:30"),
            ("Hours", "4.5"),
            ("Priority", "2"),
            ("Part", "Bracket"),
            ("Flags", "RUSH; QA"),
        ]);

        let (dept, job_row) = ScheduleFieldMapper.map_to_job_row(&row, 0).unwrap();

        assert_eq!(dept, None);
        assert_eq!(job_row.process_order, "PO-100");
        assert_eq!(job_row.machine, "M1");
        assert_eq!(job_row.start_datetime, dt(2024, 1, 5, 8, 30));
        assert_eq!(job_row.duration_hours, 4.5);
        assert_eq!(job_row.priority, 2);
        assert_eq!(job_row.end_product.as_deref(), Some("Bracket"));
        assert_eq!(job_row.status_flags, vec!["RUSH", "QA"]);
    }

    #[test]
    fn test_priority_defaults_and_float_form() {
        let row = record(&[("PO", "A"), ("Machine", "M1"), ("Start", "2024-01-01"), ("Hours", "1")]);
        let (_, job_row) = ScheduleFieldMapper.map_to_job_row(&row, 0).unwrap();
        assert_eq!(job_row.priority, 0);
        assert_eq!(job_row.start_datetime, dt(2024, 1, 1, 0, 0));

        let row = record(&[("PO", "A"), ("Start", "2024-01-01"), ("Hours", "1"), ("Priority", "3.0")]);
        let (_, job_row) = ScheduleFieldMapper.map_to_job_row(&row, 0).unwrap();
        assert_eq!(job_row.priority, 3);

        let row = record(&[("PO", "A"), ("Start", "2024-01-01"), ("Hours", "1"), ("Priority", "2.5")]);
        assert!(ScheduleFieldMapper.map_to_job_row(&row, 0).is_err());
    }

    #[test]
    fn test_excel_serial_date() {
        // 45292 = 2024-01-01, .5 = 12:00
        assert_eq!(parse_datetime("45292.5", 0).unwrap(), dt(2024, 1, 1, 12, 0));
        assert!(parse_datetime("-3", 0).is_err());
    }

    #[test]
    fn test_day_first_format() {
        assert_eq!(
            parse_datetime("15/03/2024 07:15", 0).unwrap(),
            dt(2024, 3, 15, 7, 15)
        );
    }

    #[test]
    fn test_missing_required_fields() {
        let row = record(&[("PO", "A"), ("Hours", "1")]);
        assert!(matches!(
            ScheduleFieldMapper.map_to_job_row(&row, 3),
            Err(ImportError::MissingField { row: 3, .. })
        ));

        let row = record(&[("PO", "A"), ("Start", "2024-01-01")]);
        assert!(matches!(
            ScheduleFieldMapper.map_to_job_row(&row, 0),
            Err(ImportError::MissingField { .. })
        ));
    }

    #[test]
    fn test_map_records_splits_by_department_column() {
        let records = vec![
            record(&[("Department", "Milling"), ("PO", "A"), ("Start", "2024-01-01"), ("Hours", "1")]),
            record(&[("Department", "sliding head"), ("PO", "B"), ("Start", "2024-01-01"), ("Hours", "2")]),
            record(&[("Department", "Paint"), ("PO", "C"), ("Start", "2024-01-01"), ("Hours", "2")]),
            record(&[("Department", "Milling"), ("PO", "D"), ("Start", "not a date"), ("Hours", "2")]),
        ];

        let mapped = ScheduleFieldMapper.map_records(&records, None);

        assert_eq!(mapped.rows_by_department[&Department::Milling].len(), 1);
        assert_eq!(mapped.rows_by_department[&Department::SlidingHead].len(), 1);
        assert_eq!(mapped.row_count(), 2);
        assert_eq!(mapped.issues.len(), 2);
        assert_eq!(mapped.issues[0].1.row_index, 2);
        assert_eq!(mapped.issues[0].0, None);
        assert_eq!(mapped.issues[1].0, Some(Department::Milling));
        assert_eq!(mapped.issues[1].1.process_order.as_deref(), Some("D"));
        assert_eq!(mapped.file_row(Department::SlidingHead, 0), Some(1));
        assert_eq!(mapped.file_row(Department::SlidingHead, 1), None);
    }

    #[test]
    fn test_map_records_without_department() {
        let records = vec![record(&[("PO", "A"), ("Start", "2024-01-01"), ("Hours", "1")])];

        let mapped = ScheduleFieldMapper.map_records(&records, None);
        assert!(mapped.rows_by_department.is_empty());
        assert_eq!(mapped.issues.len(), 1);

        let mapped = ScheduleFieldMapper.map_records(&records, Some(Department::Turning));
        assert_eq!(mapped.rows_by_department[&Department::Turning].len(), 1);
    }

    #[test]
    fn test_empty_file_with_default_department_clears() {
        let mapped = ScheduleFieldMapper.map_records(&[], Some(Department::Misc));
        assert_eq!(mapped.rows_by_department.get(&Department::Misc), Some(&Vec::new()));
    }
}
