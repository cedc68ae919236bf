//! 输出几何与格式协商.
//!
//! 输出格式或宽高与上次协商结果不同时, 先与宿主重新协商,
//! 再为新几何分配任何缓冲区. 零拷贝回调 (引擎工作线程) 与拷贝路径
//! (宿主线程) 都会调用这里, 因此状态由互斥锁保护.

use std::sync::{Arc, Mutex, PoisonError};

use hvdec_core::{HvError, HvResult, PixelFormat, Rational};
use log::debug;

use crate::host::{HostPipeline, OutputState};

/// 帧率缺失或不可信时使用的默认值
pub const DEFAULT_FRAME_RATE: Rational = Rational::new(24, 1);

/// 可信帧率上限 (fps)
const MAX_PLAUSIBLE_FPS: i64 = 1000;

/// 选择输出帧率
///
/// # 返回
/// (帧率, 是否回退到了默认值)
pub fn effective_frame_rate(
    frame_rate_override: Option<Rational>,
    input: Option<Rational>,
) -> (Rational, bool) {
    if let Some(rate) = frame_rate_override.filter(|r| r.num > 0 && r.den > 0) {
        return (rate, false);
    }
    match input {
        Some(rate)
            if rate.num > 0
                && rate.den > 0
                && i64::from(rate.num) <= MAX_PLAUSIBLE_FPS * i64::from(rate.den) =>
        {
            (rate, false)
        }
        _ => (DEFAULT_FRAME_RATE, true),
    }
}

#[derive(Default)]
struct NegotiatorState {
    input_frame_rate: Option<Rational>,
    current: Option<OutputState>,
}

/// 输出协商器
pub struct OutputNegotiator {
    host: Arc<dyn HostPipeline>,
    frame_rate_override: Option<Rational>,
    state: Mutex<NegotiatorState>,
}

impl OutputNegotiator {
    /// 创建协商器
    pub fn new(host: Arc<dyn HostPipeline>, frame_rate_override: Option<Rational>) -> Self {
        Self {
            host,
            frame_rate_override,
            state: Mutex::new(NegotiatorState::default()),
        }
    }

    /// 记录宿主提供的输入帧率
    pub fn set_input_frame_rate(&self, rate: Option<Rational>) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .input_frame_rate = rate;
    }

    /// 当前已协商的输出状态
    pub fn current(&self) -> Option<OutputState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    /// 清除已协商的状态, 下一幅图像将触发重新协商
    pub fn reset(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current = None;
    }

    /// 图像即将以给定几何输出, 必要时重新协商
    pub fn image_available(
        &self,
        format: PixelFormat,
        width: usize,
        height: usize,
    ) -> HvResult<OutputState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = state.current {
            if current.format == format && current.width == width && current.height == height {
                return Ok(current);
            }
        }

        let (frame_rate, defaulted) =
            effective_frame_rate(self.frame_rate_override, state.input_frame_rate);
        if defaulted {
            let input = state.input_frame_rate.unwrap_or(Rational::UNDEFINED);
            self.host.post_warning(&format!(
                "帧率无效或过高 ({input}), 使用默认值 {DEFAULT_FRAME_RATE}"
            ));
        }

        let output = OutputState {
            format,
            width,
            height,
            frame_rate,
        };
        self.host
            .negotiate(&output)
            .map_err(|e| HvError::Negotiation(format!("{format} {width}x{height}: {e}")))?;
        debug!("输出尺寸 {width}x{height}, 格式 {format}, 帧率 {frame_rate}");
        state.current = Some(output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SystemMemoryPipeline;

    #[test]
    fn test_帧率选择() {
        let r = Rational::new;
        assert_eq!(effective_frame_rate(None, Some(r(25, 1))), (r(25, 1), false));
        assert_eq!(
            effective_frame_rate(Some(r(30, 1)), Some(r(25, 1))),
            (r(30, 1), false)
        );
        assert_eq!(
            effective_frame_rate(Some(Rational::ZERO), Some(r(25, 1))),
            (r(25, 1), false)
        );
        assert_eq!(effective_frame_rate(None, None), (DEFAULT_FRAME_RATE, true));
        assert_eq!(
            effective_frame_rate(None, Some(r(0, 1))),
            (DEFAULT_FRAME_RATE, true)
        );
        assert_eq!(
            effective_frame_rate(None, Some(r(25, 0))),
            (DEFAULT_FRAME_RATE, true)
        );
        assert_eq!(
            effective_frame_rate(None, Some(r(1001, 1))),
            (DEFAULT_FRAME_RATE, true)
        );
        assert_eq!(
            effective_frame_rate(None, Some(r(1000, 1))),
            (r(1000, 1), false)
        );
    }

    #[test]
    fn test_几何不变时不重新协商() {
        let host = Arc::new(SystemMemoryPipeline::new());
        let negotiator = OutputNegotiator::new(host.clone(), None);
        negotiator.set_input_frame_rate(Some(Rational::new(30, 1)));

        let first = negotiator
            .image_available(PixelFormat::Yuv420p, 64, 48)
            .unwrap();
        assert_eq!(first.frame_rate, Rational::new(30, 1));
        assert_eq!(host.negotiated(), Some(first));

        negotiator.set_input_frame_rate(Some(Rational::new(60, 1)));
        let same = negotiator
            .image_available(PixelFormat::Yuv420p, 64, 48)
            .unwrap();
        assert_eq!(same, first);

        let changed = negotiator
            .image_available(PixelFormat::Yuv420p10le, 64, 48)
            .unwrap();
        assert_eq!(changed.format, PixelFormat::Yuv420p10le);
        assert_eq!(changed.frame_rate, Rational::new(60, 1));
        assert_eq!(negotiator.current(), Some(changed));
        assert!(host.warnings().is_empty());
    }

    #[test]
    fn test_缺失帧率回退并告警() {
        let host = Arc::new(SystemMemoryPipeline::new());
        let negotiator = OutputNegotiator::new(host.clone(), None);
        let state = negotiator.image_available(PixelFormat::Gray8, 16, 16).unwrap();
        assert_eq!(state.frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(host.warnings().len(), 1);

        negotiator.reset();
        assert_eq!(negotiator.current(), None);
    }
}
