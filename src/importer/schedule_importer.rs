// ==========================================
// 生产产能排程系统 - 排程表导入器
// ==========================================
// 流程: 文件解析 → 字段映射 → 按车间拆分
// 红线: 不落库，落库由对账引擎负责
// ==========================================

use crate::domain::types::Department;
use crate::importer::error::ImportResult;
use crate::importer::field_mapper::{MappedSchedule, ScheduleFieldMapper};
use crate::importer::file_parser::UniversalFileParser;
use std::path::Path;
use tracing::{info, instrument};

pub struct ScheduleImporter {
    parser: UniversalFileParser,
    mapper: ScheduleFieldMapper,
}

impl ScheduleImporter {
    pub fn new() -> Self {
        Self {
            parser: UniversalFileParser,
            mapper: ScheduleFieldMapper,
        }
    }

    /// 读取排程表文件
    ///
    /// # 参数
    /// - file_path: .csv / .xlsx 文件
    /// - default_department: 文件无车间列时的目标车间
    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub fn import_file<P: AsRef<Path>>(
        &self,
        file_path: P,
        default_department: Option<Department>,
    ) -> ImportResult<MappedSchedule> {
        let records = self.parser.parse(file_path.as_ref())?;
        let mapped = self.mapper.map_records(&records, default_department);

        info!(
            records = records.len(),
            mapped_rows = mapped.row_count(),
            departments = mapped.rows_by_department.len(),
            issues = mapped.issues.len(),
            "排程表读取完成"
        );
        Ok(mapped)
    }
}

impl Default for ScheduleImporter {
    fn default() -> Self {
        Self::new()
    }
}
