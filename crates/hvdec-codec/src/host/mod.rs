//! 宿主管线契约.
//!
//! 宿主拥有输出缓冲区并负责输出格式协商. 解码桥通过以下接口使用宿主:
//! - 协商输出几何与格式 (`HostPipeline::negotiate`)
//! - 按格式/宽/高申请输出缓冲区 (`HostPipeline::allocate_output_buffer`)
//! - 读写映射缓冲区, 获取平面基址、跨距、行数 (`OutputBuffer::map`)
//! - 解除映射 (`MappedFrame::unmap`) 与释放 (丢弃 `Arc`)

pub mod system;

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use bitflags::bitflags;
use hvdec_core::{HvResult, PixelFormat, Rational};
use log::warn;

pub use system::{SystemBuffer, SystemMemoryPipeline};

bitflags! {
    /// 缓冲区映射访问方式
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// 只读
        const READ = 1;
        /// 只写
        const WRITE = 1 << 1;
        /// 读写
        const READWRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// 已协商的输出状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputState {
    /// 输出像素格式
    pub format: PixelFormat,
    /// 宽度 (像素)
    pub width: usize,
    /// 高度 (像素)
    pub height: usize,
    /// 帧率
    pub frame_rate: Rational,
}

/// 已映射的输出缓冲区视图
///
/// 视图在 `unmap()` 或被丢弃时解除映射. 平面指针在解除映射前保持有效.
pub trait MappedFrame: Send {
    /// 平面数量
    fn n_planes(&self) -> usize;

    /// 平面跨距 (字节)
    fn plane_stride(&self, plane: usize) -> usize;

    /// 平面行数
    fn plane_rows(&self, plane: usize) -> usize;

    /// 平面中相邻采样的字节间距
    fn pixel_stride(&self, plane: usize) -> usize;

    /// 平面数据 (跨距 × 行数)
    fn plane_data(&self, plane: usize) -> &[u8];

    /// 可写平面数据 (跨距 × 行数)
    fn plane_data_mut(&mut self, plane: usize) -> &mut [u8];

    /// 平面起始指针, 交给引擎直接写入
    ///
    /// 对同一映射先后取得的各平面指针必须同时有效;
    /// 单块内存的实现应按偏移直接计算, 而不是经由 `plane_data_mut`.
    fn plane_ptr(&mut self, plane: usize) -> Option<NonNull<u8>> {
        NonNull::new(self.plane_data_mut(plane).as_mut_ptr())
    }

    /// 解除映射
    fn unmap(self: Box<Self>) {}
}

/// 宿主输出缓冲区
///
/// 引用计数由 `Arc` 承担: 帧交付后缓冲区的共享引用转移给宿主帧,
/// 宿主释放最后一个引用时缓冲区才真正回收.
pub trait OutputBuffer: Send + Sync + fmt::Debug {
    /// 按访问方式映射缓冲区
    fn map(&self, flags: MapFlags) -> HvResult<Box<dyn MappedFrame>>;
}

/// 宿主管线
///
/// 回调可能来自引擎工作线程, 实现必须是 `Send + Sync`.
pub trait HostPipeline: Send + Sync {
    /// 协商新的输出几何与格式
    fn negotiate(&self, state: &OutputState) -> HvResult<()>;

    /// 按当前输出状态分配一个输出缓冲区
    fn allocate_output_buffer(&self, state: &OutputState) -> HvResult<Arc<dyn OutputBuffer>>;

    /// 上报非致命警告
    fn post_warning(&self, message: &str) {
        warn!("{message}");
    }
}
