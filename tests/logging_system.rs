use chrono::Local;
use hvdec::logging::{LoggingConfig, MaintenanceReport, init, run_maintenance_pass};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// 注意: 由于 tracing 的全局订阅器只能初始化一次,
// 涉及 init() 的测试必须单独运行或使用 #[ignore] 标记

fn config_in(dir: &TempDir, prefix: &str, level: &str) -> LoggingConfig {
    LoggingConfig {
        level: level.to_string(),
        directory: dir.path().to_string_lossy().to_string(),
        file_prefix: prefix.to_string(),
        retention_days: 7,
        compress_history: false,
        ..LoggingConfig::default()
    }
}

/// 获取当前日期的日志文件路径
fn today_log_path(dir: &TempDir, prefix: &str) -> PathBuf {
    let today = Local::now().date_naive();
    dir.path()
        .join(format!("{}.{}.log", prefix, today.format("%Y-%m-%d")))
}

#[tokio::test]
#[ignore] // 需要单独运行: cargo test --test logging_system test_logging_file_content -- --ignored
async fn test_logging_file_content() {
    let dir = TempDir::new().unwrap();
    init(config_in(&dir, "content-test", "info")).expect("日志初始化失败");

    tracing::error!("错误日志_ERROR_MSG");
    tracing::info!("解码会话启动_INFO_MSG");
    tracing::debug!("调试日志_DEBUG_MSG"); // 应该被过滤掉
    // 库 crate 经 log 门面输出的日志同样写入文件
    log::warn!("帧率无效或过高_LOG_MSG");

    std::thread::sleep(std::time::Duration::from_millis(200));

    let log_file = today_log_path(&dir, "content-test");
    let content = fs::read_to_string(&log_file)
        .unwrap_or_else(|e| panic!("读取日志文件失败: {:?}, 错误: {}", log_file, e));

    assert!(content.contains("错误日志_ERROR_MSG"), "应该包含错误日志");
    assert!(content.contains("解码会话启动_INFO_MSG"), "应该包含信息日志");
    assert!(content.contains("帧率无效或过高_LOG_MSG"), "应该包含 log 门面日志");
    assert!(content.contains("INFO"), "日志应该包含 INFO 级别标记");
    assert!(
        !content.contains("调试日志_DEBUG_MSG"),
        "debug 日志应该被过滤掉"
    );

    // 重复初始化失败
    assert!(init(config_in(&dir, "content-test", "info")).is_err());
}

#[test]
fn test_维护_只处理匹配前缀的文件() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "hvdec-probe", "info");
    let today = Local::now().date_naive();
    let old = today - chrono::Duration::days(30);

    let old_name = format!("hvdec-probe.{}.log", old.format("%Y-%m-%d"));
    let other_name = format!("hvdec.{}.log", old.format("%Y-%m-%d"));
    fs::write(dir.path().join(&old_name), b"old").unwrap();
    fs::write(dir.path().join(&other_name), b"other").unwrap();
    fs::write(today_log_path(&dir, "hvdec-probe"), b"today").unwrap();

    let report = run_maintenance_pass(&config, today).unwrap();
    assert_eq!(
        report,
        MaintenanceReport {
            removed: 1,
            compressed: 0
        }
    );
    assert!(!dir.path().join(&old_name).exists());
    assert!(dir.path().join(&other_name).exists());
    assert!(today_log_path(&dir, "hvdec-probe").exists());
}

#[test]
fn test_维护_目录不存在() {
    let dir = TempDir::new().unwrap();
    let config = LoggingConfig {
        directory: dir.path().join("missing").to_string_lossy().to_string(),
        ..LoggingConfig::default()
    };
    let report = run_maintenance_pass(&config, Local::now().date_naive()).unwrap();
    assert_eq!(report, MaintenanceReport::default());
}
