// ==========================================
// 生产产能排程系统 - 导入层
// ==========================================
// 职责: 排程表文件 → 按车间拆分的 JobRow
// 支持: Excel (.xlsx), CSV
// ==========================================

pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod schedule_importer;
pub mod schedule_importer_trait;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use field_mapper::{MappedSchedule, ScheduleFieldMapper};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use schedule_importer::ScheduleImporter;

// 重导出 Trait 接口
pub use schedule_importer_trait::{FieldMapper, FileParser, RawRecord};
