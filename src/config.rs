//! 应用配置.
//!
//! JSON 文件, 所有字段可省略:
//! ```json
//! {
//!   "logging": { "level": "info", "directory": "logs", "file_prefix": "hvdec" },
//!   "decoder": { "mode": "packetized", "frame_rate": { "num": 0, "den": 1 }, "max_threads": 0 }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use hvdec_codec::DecoderSettings;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// 应用配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// 日志配置
    pub logging: LoggingConfig,
    /// 解码会话配置
    pub decoder: DecoderSettings,
}

impl Config {
    /// 从 JSON 字符串解析并校验
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("解析配置失败")?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("配置文件无效, path={}", path.display()))
    }

    /// 校验各部分配置
    pub fn validate(&self) -> Result<()> {
        self.decoder.validate().context("解码配置无效")?;
        anyhow::ensure!(
            self.logging.retention_days >= 0,
            "日志保留天数不能为负: {}",
            self.logging.retention_days
        );
        Ok(())
    }
}
