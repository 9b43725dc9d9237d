// ==========================================
// 生产产能排程系统 - 排程表导入 Trait
// ==========================================
// 职责: 定义文件解析/字段映射接口（不包含实现）
// ==========================================

use crate::domain::job::JobRow;
use crate::domain::types::Department;
use crate::importer::error::ImportResult;
use std::collections::HashMap;
use std::path::Path;

/// 原始记录: 表头 → 单元格文本
pub type RawRecord = HashMap<String, String>;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析文件为原始记录（HashMap 格式）
    ///
    /// # 参数
    /// - file_path: 文件路径
    ///
    /// # 返回
    /// - Ok(Vec<RawRecord>): 每行一个 HashMap（key=表头，value=单元格值）
    /// - Err: 文件不存在、格式不支持、解析失败
    ///
    /// # 说明
    /// - 第一行为表头
    /// - 完全空白的行被跳过
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRecord>>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 字段映射接口
// 实现者: ScheduleFieldMapper
pub trait FieldMapper: Send + Sync {
    /// 将单行原始记录映射为 JobRow
    ///
    /// # 参数
    /// - row: 原始记录
    /// - row_index: 行号（从 0 开始，不含表头）
    ///
    /// # 返回
    /// - Ok((Some(Department), JobRow)): 行内带车间列
    /// - Ok((None, JobRow)): 行内无车间，由调用方指定
    /// - Err: 必填字段缺失或类型转换失败
    fn map_to_job_row(
        &self,
        row: &RawRecord,
        row_index: usize,
    ) -> ImportResult<(Option<Department>, JobRow)>;
}
