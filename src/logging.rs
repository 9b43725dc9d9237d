// ==========================================
// 生产产能排程系统 - 日志系统
// ==========================================
// 输出: stderr（stdout 留给 CLI 的 JSON 结果）
// 格式: 文本 / JSON 行，由 PRODUCTION_CAPACITY_LOG_FORMAT 选择
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// RUST_LOG 未设置时的过滤器
const DEFAULT_FILTER: &str = "info";

/// 日志格式环境变量
pub const LOG_FORMAT_ENV: &str = "PRODUCTION_CAPACITY_LOG_FORMAT";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 文本格式日志
///
/// # 环境变量
/// - RUST_LOG: 过滤器，例如 RUST_LOG=production_capacity::engine=debug
///
/// # 示例
/// ```no_run
/// production_capacity::logging::init();
/// ```
pub fn init() {
    // 已有全局 subscriber 时忽略
    let _ = fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// JSON 行格式日志，带当前 span 字段
pub fn init_json() {
    let _ = fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 按 PRODUCTION_CAPACITY_LOG_FORMAT 选择格式（json / 其他为文本）
pub fn init_from_env() {
    match std::env::var(LOG_FORMAT_ENV) {
        Ok(format) if format.trim().eq_ignore_ascii_case("json") => init_json(),
        _ => init(),
    }
}

/// 测试日志: debug 级别，输出交给测试框架捕获
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
