use std::{fs::OpenOptions, io::Write, path::PathBuf, sync::RwLock};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::settings::Settings;

static TELEMETRY_ENABLED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

static LOG_DIR: Lazy<RwLock<PathBuf>> = Lazy::new(|| RwLock::new(PathBuf::from("logs")));

const LOG_FILE: &str = "auditscribe.log";

/**
 * \brief 依据进程配置初始化运行日志通道。
 */
pub fn configure(settings: &Settings) {
    if let Ok(mut guard) = LOG_DIR.write() {
        *guard = settings.log_dir.clone();
    }
    set_enabled(settings.telemetry_enabled);
}

/**
 * \brief 更新遥测开关状态。
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY_ENABLED.write() {
        *guard = enabled;
    }
}

/**
 * \brief 查询当前遥测开关状态。
 */
pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.read().map(|g| *g).unwrap_or(false)
}

/**
 * \brief 记录常规事件。
 */
pub fn log_event(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("INFO", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

/**
 * \brief 记录警告事件（可恢复的异常，如结构化解析失败、模型检测失败）。
 */
pub fn log_warn(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("WARN", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

/**
 * \brief 记录错误事件。
 */
pub fn log_error(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("ERROR", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

fn write_line(level: &str, category: &str, message: &str) -> Result<()> {
    let log_dir = LOG_DIR
        .read()
        .map(|g| g.clone())
        .unwrap_or_else(|_| PathBuf::from("logs"));
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)?;
    }
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))?;
    writeln!(file, "{} [{}] {} - {}", timestamp, level, category, message)?;
    Ok(())
}
