//! 压缩数据包 (Packet).
//!
//! 宿主每次送入的一个数据块: 一个访问单元, 或任意字节区间.
//! 空数据包是流结束标记.

use bytes::Bytes;
use hvdec_core::NOPTS_VALUE;

/// 压缩数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 压缩数据
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 宿主为该输入帧分配的系统帧号
    pub frame_number: u32,
}

impl Packet {
    /// 创建空数据包 (流结束)
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: NOPTS_VALUE,
            frame_number: 0,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 设置时间戳
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// 设置系统帧号
    pub fn with_frame_number(mut self, frame_number: u32) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包 (流结束标记)
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
