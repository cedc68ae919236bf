//! 解码会话配置.
//!
//! 替代宿主侧的属性表: 构造会话时传入一次, 并在构造时校验.

use hvdec_core::{HvError, HvResult, Rational};
use serde::{Deserialize, Serialize};

/// 自动检测核心数失败时的工作线程数
pub const DEFAULT_THREAD_COUNT: usize = 2;

/// 工作线程数上限
pub const MAX_THREAD_COUNT: usize = 32;

/// 帧率覆盖值的上限 (fps)
pub const MAX_FRAME_RATE_OVERRIDE: i32 = 100;

/// 码流约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// 长度前缀封装
    #[default]
    Packetized,
    /// 起始码字节流
    Raw,
}

impl StreamMode {
    /// 名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Packetized => "packetized",
            Self::Raw => "raw",
        }
    }
}

/// 解码会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    /// 初始码流约定, 带外配置记录到达后以记录为准
    pub mode: StreamMode,
    /// 帧率覆盖值, 分子为 0 表示不覆盖
    pub frame_rate: Rational,
    /// 最大工作线程数, 0 表示按 CPU 核心数自动选择
    pub max_threads: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            mode: StreamMode::Packetized,
            frame_rate: Rational::ZERO,
            max_threads: 0,
        }
    }
}

impl DecoderSettings {
    /// 校验配置
    pub fn validate(&self) -> HvResult<()> {
        let Rational { num, den } = self.frame_rate;
        if num < 0 || den <= 0 || i64::from(num) > i64::from(MAX_FRAME_RATE_OVERRIDE) * i64::from(den)
        {
            return Err(HvError::InvalidArgument(format!(
                "帧率覆盖值超出范围 0/1..={MAX_FRAME_RATE_OVERRIDE}/1: {}",
                self.frame_rate
            )));
        }
        Ok(())
    }

    /// 生效的帧率覆盖值
    pub fn frame_rate_override(&self) -> Option<Rational> {
        (self.frame_rate.num > 0).then_some(self.frame_rate)
    }

    /// 实际启动的工作线程数
    pub fn worker_threads(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .ok()
            .map(|n| n.get());
        resolve_worker_threads(self.max_threads, cores)
    }
}

/// 计算工作线程数
///
/// 显式配置优先; 否则使用核心数, 核心数未知时取默认值.
/// 结果限制在 1..=32.
pub fn resolve_worker_threads(max_threads: usize, cores: Option<usize>) -> usize {
    let threads = if max_threads > 0 {
        max_threads
    } else {
        cores.filter(|&n| n > 0).unwrap_or(DEFAULT_THREAD_COUNT)
    };
    threads.clamp(1, MAX_THREAD_COUNT)
}
