//! 解码输出帧.
//!
//! 无论零拷贝还是拷贝路径, 像素数据都位于宿主分配的输出缓冲区中.

use std::sync::Arc;

use hvdec_core::{PixelFormat, Rational};

use crate::host::OutputBuffer;

/// 视频帧
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 宿主输出缓冲区
    pub buffer: Arc<dyn OutputBuffer>,
    /// 像素格式
    pub pixel_format: PixelFormat,
    /// 宽度 (像素)
    pub width: usize,
    /// 高度 (像素)
    pub height: usize,
    /// 显示时间戳 (取自引擎图像)
    pub pts: i64,
    /// 对应的宿主系统帧号
    pub frame_number: u32,
    /// 协商得到的帧率
    pub frame_rate: Rational,
    /// 是否由引擎直接写入宿主缓冲区
    pub zero_copy: bool,
}
