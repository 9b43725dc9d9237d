// ==========================================
// 生产产能排程系统 - 命令行入口
// ==========================================
// 用法:
//   production-capacity import <file> [department] [user]
//   production-capacity snapshot <department>
//   production-capacity move <department> <process_order> <machine> <start> <hours> <priority> [user] [reason]
//   production-capacity release <department> <process_order> [user]
//   production-capacity machine <department> <name> [active]
//   production-capacity machines <department>
//   production-capacity history <department> [limit]
//   production-capacity config [<key> <value>]
// ==========================================

use anyhow::{anyhow, bail, Context};
use production_capacity::app::{get_default_db_path, AppState};
use production_capacity::importer::field_mapper::parse_datetime;
use production_capacity::{Department, MoveRequest};
use serde::Serialize;

const USAGE: &str = "用法: production-capacity <import|snapshot|move|release|machine|machines|history|config> [参数...]";

fn parse_department(value: Option<&String>) -> anyhow::Result<Department> {
    let raw = value.ok_or_else(|| anyhow!("缺少车间参数\n{}", USAGE))?;
    Department::parse(raw).ok_or_else(|| anyhow!("无法识别的车间: {}", raw))
}

fn required<'a>(args: &'a [String], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("缺少参数 <{}>\n{}", name, USAGE))
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("无法识别的布尔值: {}", other),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    production_capacity::logging::init_from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match args.first() {
        Some(c) => c.as_str(),
        None => {
            eprintln!("{} v{}", production_capacity::APP_NAME, production_capacity::VERSION);
            eprintln!("{}", USAGE);
            return Ok(());
        }
    };

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);
    let state = AppState::new(db_path).context("无法初始化AppState")?;
    let api = state.capacity_api.clone();

    match command {
        "import" => {
            let file = required(&args, 1, "file")?;
            let department = match args.get(2) {
                Some(raw) => Some(parse_department(Some(raw))?),
                None => None,
            };
            let user = args.get(3).map(String::as_str).unwrap_or("cli");

            let summary = api.upload_file(file, department, user).await?;
            print_json(&summary)?;
        }
        "snapshot" => {
            let department = parse_department(args.get(1))?;
            print_json(&api.capacity_snapshot(department)?)?;
        }
        "move" => {
            let department = parse_department(args.get(1))?;
            let process_order = required(&args, 2, "process_order")?;
            let machine = required(&args, 3, "machine")?;
            let start = parse_datetime(required(&args, 4, "start")?, 0)?;
            let hours: f64 = required(&args, 5, "hours")?
                .parse()
                .context("工时必须为数字")?;
            let priority: i32 = required(&args, 6, "priority")?
                .parse()
                .context("优先级必须为整数")?;

            let job = api
                .move_job(MoveRequest {
                    department,
                    process_order: process_order.to_string(),
                    to_machine: machine.to_string(),
                    new_duration_hours: hours,
                    new_start: start,
                    new_priority: priority,
                    moved_by: args.get(7).cloned().unwrap_or_else(|| "cli".to_string()),
                    reason: args.get(8).cloned(),
                })
                .await?;
            print_json(&job)?;
        }
        "release" => {
            let department = parse_department(args.get(1))?;
            let process_order = required(&args, 2, "process_order")?;
            let user = args.get(3).map(String::as_str).unwrap_or("cli");
            print_json(&api.release_override(department, process_order, user)?)?;
        }
        "machine" => {
            let department = parse_department(args.get(1))?;
            let name = required(&args, 2, "name")?;
            let active = match args.get(3) {
                Some(v) => parse_bool(v)?,
                None => true,
            };
            print_json(&api.register_machine(department, name, active, None)?)?;
        }
        "machines" => {
            let department = parse_department(args.get(1))?;
            print_json(&api.list_machines(department)?)?;
        }
        "history" => {
            let department = parse_department(args.get(1))?;
            let limit: usize = match args.get(2) {
                Some(v) => v.parse().context("limit 必须为正整数")?,
                None => 20,
            };
            print_json(&api.upload_history(department, limit)?)?;
        }
        "config" => match (args.get(1), args.get(2)) {
            (Some(key), Some(value)) => {
                state.config_manager.set_global_config_value(key, value)?;
                println!("{}", state.config_manager.get_config_snapshot()?);
            }
            (None, _) => println!("{}", state.config_manager.get_config_snapshot()?),
            (Some(key), None) => bail!("缺少配置值: {}", key),
        },
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }

    Ok(())
}
