//! 零拷贝帧桥接.
//!
//! 实现引擎的分配回调: 为正在解码的图像申请宿主输出缓冲区, 以读写方式映射,
//! 把各平面基址/跨距交给引擎, 并以 [`FrameRef`] 作为平面用户数据.
//! 任何前置条件不满足时交由引擎默认分配器, 该图像随后走拷贝路径.
//!
//! 生命周期:
//! - 每次 `Bound` 都恰好对应一次 `Released`, 无论图像是否被交付
//! - 交付时缓冲区引用转移给宿主帧, `FrameRef` 本身在释放回调中丢弃
//! - `FrameRef` 至多映射一次, 并在释放时解除映射

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use hvdec_core::PixelFormat;
use log::{debug, error, trace};

use super::format::resolve_exact_format;
use super::negotiate::OutputNegotiator;
use crate::engine::{
    BufferAllocation, BufferRelease, DecodedPicture, PictureAllocator, PictureSlot, PictureSpec,
    PlaneBinding, PlaneTag,
};
use crate::host::{HostPipeline, MapFlags, MappedFrame, OutputBuffer, OutputState};

struct FrameRefState {
    buffer: Option<Arc<dyn OutputBuffer>>,
    view: Option<Box<dyn MappedFrame>>,
}

/// 一个宿主输出缓冲区与一个在途引擎图像之间的绑定
pub struct FrameRef {
    frame_number: u32,
    output: OutputState,
    state: Mutex<FrameRefState>,
}

impl FrameRef {
    fn new(frame_number: u32, output: OutputState, buffer: Arc<dyn OutputBuffer>) -> Self {
        Self {
            frame_number,
            output,
            state: Mutex::new(FrameRefState {
                buffer: Some(buffer),
                view: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrameRefState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 分配时的宿主系统帧号
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// 分配时协商的输出状态
    pub fn output(&self) -> OutputState {
        self.output
    }

    /// 是否仍处于映射状态
    pub fn is_mapped(&self) -> bool {
        self.lock().view.is_some()
    }

    /// 交付: 取走缓冲区引用, 转移给宿主帧
    pub fn take_buffer(&self) -> Option<Arc<dyn OutputBuffer>> {
        self.lock().buffer.take()
    }

    /// 解除映射并丢弃缓冲区引用
    ///
    /// # 返回
    /// 本次调用是否执行了解除映射
    fn release(&self) -> bool {
        let (view, buffer) = {
            let mut state = self.lock();
            (state.view.take(), state.buffer.take())
        };
        let was_mapped = view.is_some();
        if let Some(view) = view {
            view.unmap();
        }
        drop(buffer);
        was_mapped
    }
}

impl fmt::Debug for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRef")
            .field("frame_number", &self.frame_number)
            .field("output", &self.output)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// 从已解码图像的平面 0 用户数据取回 `FrameRef`
pub fn frame_ref_of(picture: &dyn DecodedPicture) -> Option<Arc<FrameRef>> {
    downcast_tag(picture.plane_tag(0))
}

fn downcast_tag(tag: Option<PlaneTag>) -> Option<Arc<FrameRef>> {
    tag.and_then(|tag| tag.downcast::<FrameRef>().ok())
}

/// 桥接统计
#[derive(Debug, Default)]
pub struct BridgeStats {
    bound: AtomicU64,
    fallbacks: AtomicU64,
    released: AtomicU64,
    unmapped: AtomicU64,
}

/// 桥接统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStatsSnapshot {
    /// 零拷贝绑定次数
    pub bound: u64,
    /// 回退到默认分配器的次数
    pub fallbacks: u64,
    /// 释放 `FrameRef` 的次数
    pub released: u64,
    /// 释放时解除映射的次数
    pub unmapped: u64,
}

impl BridgeStatsSnapshot {
    /// 仍在途的零拷贝绑定数
    pub fn outstanding(&self) -> u64 {
        self.bound.saturating_sub(self.released)
    }
}

impl BridgeStats {
    /// 读取快照
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            bound: self.bound.load(Ordering::Acquire),
            fallbacks: self.fallbacks.load(Ordering::Acquire),
            released: self.released.load(Ordering::Acquire),
            unmapped: self.unmapped.load(Ordering::Acquire),
        }
    }
}

/// 零拷贝分配器, 安装到引擎上
pub struct ZeroCopyAllocator {
    host: Arc<dyn HostPipeline>,
    negotiator: Arc<OutputNegotiator>,
    frame_number: AtomicU32,
    stats: BridgeStats,
}

/// 不满足零拷贝条件的原因
enum Fallback {
    Cropped,
    MixedBitDepth([u32; 3]),
    NoExactFormat(u32),
    Negotiation,
    Allocation,
    Map,
    PlaneMissing(usize),
    PitchTooSmall(usize, usize),
    TooFewLines(usize, usize),
    PitchUnaligned(usize, usize),
    BaseUnaligned(usize),
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cropped => write!(f, "图像带裁剪"),
            Self::MixedBitDepth(d) => write!(f, "各平面位深不一致 ({}/{}/{})", d[0], d[1], d[2]),
            Self::NoExactFormat(bits) => write!(f, "没有 {bits} 位存储的输出格式"),
            Self::Negotiation => write!(f, "输出协商失败"),
            Self::Allocation => write!(f, "输出缓冲区分配失败"),
            Self::Map => write!(f, "输出缓冲区映射失败"),
            Self::PlaneMissing(p) => write!(f, "平面 {p}: 缓冲区缺少该平面"),
            Self::PitchTooSmall(stride, need) => {
                write!(f, "平面 0: 跨距过小 ({stride}/{need})")
            }
            Self::TooFewLines(rows, need) => write!(f, "平面 0: 行数不足 ({rows}/{need})"),
            Self::PitchUnaligned(p, stride) => write!(f, "平面 {p}: 跨距未对齐 ({stride})"),
            Self::BaseUnaligned(p) => write!(f, "平面 {p}: 基址未对齐"),
        }
    }
}

impl ZeroCopyAllocator {
    /// 创建分配器
    pub fn new(host: Arc<dyn HostPipeline>, negotiator: Arc<OutputNegotiator>) -> Self {
        Self {
            host,
            negotiator,
            frame_number: AtomicU32::new(0),
            stats: BridgeStats::default(),
        }
    }

    /// 设置当前宿主系统帧号, 新绑定的 `FrameRef` 记录此值
    pub fn set_frame_number(&self, frame_number: u32) {
        self.frame_number.store(frame_number, Ordering::Release);
    }

    /// 当前宿主系统帧号
    pub fn frame_number(&self) -> u32 {
        self.frame_number.load(Ordering::Acquire)
    }

    /// 统计快照
    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    fn select_format(&self, spec: &PictureSpec) -> Result<PixelFormat, Fallback> {
        if spec.aligned_width() != spec.visible_width || spec.height != spec.visible_height {
            return Err(Fallback::Cropped);
        }
        let bit_depth = spec
            .uniform_bit_depth()
            .ok_or(Fallback::MixedBitDepth(spec.bit_depths))?;
        resolve_exact_format(spec.chroma, bit_depth).ok_or(Fallback::NoExactFormat(bit_depth))
    }

    /// 校验映射后的布局, 返回各平面绑定 (不含用户数据)
    fn plan_bindings(
        spec: &PictureSpec,
        view: &mut dyn MappedFrame,
        planes: usize,
    ) -> Result<Vec<(NonNull<u8>, usize, usize)>, Fallback> {
        let width = spec.aligned_width();
        let alignment = spec.alignment.max(1);
        if view.n_planes() < planes {
            return Err(Fallback::PlaneMissing(view.n_planes()));
        }
        let need = width * view.pixel_stride(0);
        if view.plane_stride(0) < need {
            return Err(Fallback::PitchTooSmall(view.plane_stride(0), need));
        }
        if view.plane_rows(0) < spec.height {
            return Err(Fallback::TooFewLines(view.plane_rows(0), spec.height));
        }

        let mut bindings = Vec::with_capacity(planes);
        for plane in 0..planes {
            let stride = view.plane_stride(plane);
            if stride % alignment != 0 {
                return Err(Fallback::PitchUnaligned(plane, stride));
            }
            let rows = view.plane_rows(plane);
            let base = view
                .plane_ptr(plane)
                .ok_or(Fallback::BaseUnaligned(plane))?;
            if base.as_ptr() as usize % alignment != 0 {
                return Err(Fallback::BaseUnaligned(plane));
            }
            bindings.push((base, stride, rows));
        }
        Ok(bindings)
    }

    fn try_bind(&self, spec: &PictureSpec, slot: &mut dyn PictureSlot) -> Result<(), Fallback> {
        let format = self.select_format(spec)?;
        let output = self
            .negotiator
            .image_available(format, spec.aligned_width(), spec.height)
            .map_err(|e| {
                error!("通知图像可用失败: {e}");
                Fallback::Negotiation
            })?;
        let buffer = self.host.allocate_output_buffer(&output).map_err(|e| {
            error!("分配输出缓冲区失败: {e}");
            Fallback::Allocation
        })?;

        let frame_ref = Arc::new(FrameRef::new(self.frame_number(), output, buffer.clone()));
        let mut view = buffer.map(MapFlags::READWRITE).map_err(|e| {
            error!("映射输出缓冲区失败: {e}");
            Fallback::Map
        })?;
        let bindings = match Self::plan_bindings(spec, view.as_mut(), spec.chroma.plane_count()) {
            Ok(bindings) => bindings,
            Err(reason) => {
                view.unmap();
                return Err(reason);
            }
        };

        frame_ref.lock().view = Some(view);
        let tag: PlaneTag = frame_ref;
        for (plane, (data, stride, rows)) in bindings.into_iter().enumerate() {
            slot.set_plane(
                plane,
                PlaneBinding {
                    data,
                    stride,
                    rows,
                    tag: Some(Arc::clone(&tag)),
                },
            );
        }
        Ok(())
    }
}

impl PictureAllocator for ZeroCopyAllocator {
    fn get_buffer(&self, spec: &PictureSpec, slot: &mut dyn PictureSlot) -> BufferAllocation {
        match self.try_bind(spec, slot) {
            Ok(()) => {
                self.stats.bound.fetch_add(1, Ordering::AcqRel);
                trace!(
                    "零拷贝绑定: {}x{} {} 帧号 {}",
                    spec.width,
                    spec.height,
                    spec.chroma,
                    self.frame_number()
                );
                BufferAllocation::Bound
            }
            Err(reason) => {
                self.stats.fallbacks.fetch_add(1, Ordering::AcqRel);
                debug!("零拷贝不可用, 使用默认分配: {reason}");
                BufferAllocation::Default
            }
        }
    }

    fn release_buffer(&self, slot: &mut dyn PictureSlot) -> BufferRelease {
        let Some(frame_ref) = downcast_tag(slot.plane_tag(0)) else {
            return BufferRelease::Default;
        };
        if frame_ref.release() {
            self.stats.unmapped.fetch_add(1, Ordering::AcqRel);
        }
        self.stats.released.fetch_add(1, Ordering::AcqRel);
        BufferRelease::Released
    }
}
