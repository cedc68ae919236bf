use super::{LoggingConfig, build_current_log_path};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, error};

/// 一次维护的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// 删除的过期文件数
    pub removed: usize,
    /// 压缩的历史文件数
    pub compressed: usize,
}

pub(super) fn spawn_log_maintenance_task(
    handle: &tokio::runtime::Handle,
    config: LoggingConfig,
    rotate_requested: Arc<AtomicBool>,
) {
    handle.spawn(async move {
        let mut cleanup_interval =
            tokio::time::interval(Duration::from_secs(config.cleanup_interval_seconds.max(1)));
        let mut next_rollover_at = next_rollover_or_retry(Local::now());

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    maintain(&config, "定期清理日志失败");
                }
                _ = tokio::time::sleep_until(next_rollover_at) => {
                    match ensure_current_log_file(&config) {
                        Ok(()) => rotate_requested.store(true, Ordering::Release),
                        Err(err) => error!("日志翻滚失败: {err:#}"),
                    }
                    maintain(&config, "翻滚后清理日志失败");
                    next_rollover_at = next_rollover_or_retry(Local::now());
                }
            }
        }
    });
}

fn maintain(config: &LoggingConfig, context: &str) {
    match run_maintenance_pass(config, Local::now().date_naive()) {
        Ok(report) if report != MaintenanceReport::default() => {
            debug!(
                "日志维护: 删除 {} 个, 压缩 {} 个",
                report.removed, report.compressed
            );
        }
        Ok(_) => {}
        Err(err) => error!("{context}: {err:#}"),
    }
}

fn next_rollover_or_retry(now: DateTime<Local>) -> tokio::time::Instant {
    compute_next_rollover(now).unwrap_or_else(|err| {
        error!("计算下一次翻滚时间失败: {err:#}");
        tokio::time::Instant::now() + Duration::from_secs(1)
    })
}

fn ensure_current_log_file(config: &LoggingConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let current_path =
        build_current_log_path(directory, &config.file_prefix, Local::now().date_naive());
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&current_path)
        .with_context(|| format!("创建当前日志文件失败, path={}", current_path.display()))?;
    Ok(())
}

/// 按保留天数清理并压缩历史日志
///
/// 早于 `today - retention_days` 的文件删除; 早于今天且未压缩的文件在
/// `compress_history` 开启时压缩为 `.gz`. 当日文件不动.
pub fn run_maintenance_pass(config: &LoggingConfig, today: NaiveDate) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(report);
    }

    let cutoff = today - ChronoDuration::days(config.retention_days);
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((date, compressed)) = parse_rotated_log_name(&file_name, &config.file_prefix)
        else {
            continue;
        };

        let path = entry.path();
        if date < cutoff {
            if fs::remove_file(&path).is_ok() {
                report.removed += 1;
            }
        } else if config.compress_history && !compressed && date < today {
            match compress_to_gz(&path) {
                Ok(true) => report.compressed += 1,
                Ok(false) => {}
                Err(err) => error!("压缩日志失败: {err:#}"),
            }
        }
    }
    Ok(report)
}

/// 压缩为同名 `.gz` 并删除原文件; 目标已存在时跳过
fn compress_to_gz(path: &Path) -> Result<bool> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(false);
    }

    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;

    fs::remove_file(path)
        .with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(true)
}

fn parse_rotated_log_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    if let Some(date_part) = rest.strip_suffix(".log.gz") {
        return parse_date(date_part).map(|date| (date, true));
    }
    rest.strip_suffix(".log")
        .and_then(parse_date)
        .map(|date| (date, false))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn compute_next_rollover(now: DateTime<Local>) -> Result<tokio::time::Instant> {
    let next_midnight = (now.date_naive() + ChronoDuration::days(1))
        .and_hms_opt(0, 0, 0)
        .context("计算下一次日志翻滚时间失败")?;
    let next_local = Local
        .from_local_datetime(&next_midnight)
        .earliest()
        .context("转换本地时间失败")?;
    let system_time = SystemTime::from(next_local.with_timezone(&Utc));
    let duration = system_time
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Ok(tokio::time::Instant::now() + duration)
}
