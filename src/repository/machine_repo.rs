// ==========================================
// 生产产能排程系统 - 机台登记仓储
// ==========================================
// 职责: 管理 machine 表 (按车间+机台名)
// 说明: 核心只通过 ResourceRegistry::list_machines 读取，
//       维护接口供初始化/命令行使用
// ==========================================

use crate::domain::machine::Machine;
use crate::domain::types::Department;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ResourceRegistry - 机台登记接口
// ==========================================
pub trait ResourceRegistry: Send + Sync {
    /// 列出车间机台（按名称排序，含停用机台）
    fn list_machines(&self, department: Department) -> RepositoryResult<Vec<Machine>>;
}

pub struct MachineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建或更新机台
    pub fn upsert_machine(&self, machine: &Machine) -> RepositoryResult<()> {
        if machine.name.trim().is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "name".to_string(),
                message: "机台名不能为空".to_string(),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO machine (department, name, is_active, description)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(department, name) DO UPDATE SET
                is_active = excluded.is_active,
                description = excluded.description
            "#,
            params![
                machine.department.as_str(),
                machine.name.trim(),
                machine.is_active,
                machine.description,
            ],
        )?;
        Ok(())
    }

    /// 启用/停用机台
    pub fn set_active(
        &self,
        department: Department,
        name: &str,
        is_active: bool,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE machine SET is_active = ?1 WHERE department = ?2 AND name = ?3",
            params![is_active, department.as_str(), name],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Machine".to_string(),
                id: format!("{}/{}", department, name),
            });
        }
        Ok(())
    }

    /// 按主键查找机台
    pub fn find(&self, department: Department, name: &str) -> RepositoryResult<Option<Machine>> {
        let conn = self.get_conn()?;
        let machine = conn
            .query_row(
                r#"
                SELECT department, name, is_active, description
                FROM machine
                WHERE department = ?1 AND name = ?2
                "#,
                params![department.as_str(), name],
                map_machine_row,
            )
            .optional()?;
        Ok(machine)
    }
}

impl ResourceRegistry for MachineRepository {
    fn list_machines(&self, department: Department) -> RepositoryResult<Vec<Machine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT department, name, is_active, description
            FROM machine
            WHERE department = ?1
            ORDER BY name
            "#,
        )?;

        let machines = stmt
            .query_map(params![department.as_str()], map_machine_row)?
            .collect::<SqliteResult<Vec<Machine>>>()?;
        Ok(machines)
    }
}

fn map_machine_row(row: &Row<'_>) -> SqliteResult<Machine> {
    let department_raw: String = row.get(0)?;
    Ok(Machine {
        department: Department::parse(&department_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("未知车间: {}", department_raw).into(),
            )
        })?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        description: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> MachineRepository {
        let conn = crate::db::open_in_memory().unwrap();
        MachineRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_list_machines_sorted_and_scoped() {
        let repo = setup();
        repo.upsert_machine(&Machine::new(Department::Milling, "VMC-2")).unwrap();
        repo.upsert_machine(&Machine::new(Department::Milling, "VMC-1")).unwrap();
        repo.upsert_machine(&Machine::new(Department::Turning, "LATHE-1")).unwrap();

        let names: Vec<String> = repo
            .list_machines(Department::Milling)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["VMC-1".to_string(), "VMC-2".to_string()]);
    }

    #[test]
    fn test_set_active_unknown_machine() {
        let repo = setup();
        let result = repo.set_active(Department::Misc, "NOPE", false);
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[test]
    fn test_set_active_toggles() {
        let repo = setup();
        repo.upsert_machine(&Machine::new(Department::SlidingHead, "SH-1")).unwrap();
        repo.set_active(Department::SlidingHead, "SH-1", false).unwrap();

        let machine = repo.find(Department::SlidingHead, "SH-1").unwrap().unwrap();
        assert!(!machine.is_active);
    }
}
