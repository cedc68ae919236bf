//! 基于系统内存的参考宿主实现.
//!
//! 输出缓冲区为堆内存, 每个平面的基址与跨距都按配置的对齐值对齐,
//! 因此满足引擎零拷贝的对齐要求. 同一缓冲区同一时刻至多一个写映射,
//! 读映射可与写映射并存.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex, PoisonError};

use hvdec_core::{HvError, HvResult, PixelFormat};
use log::{debug, info};

use super::{HostPipeline, MapFlags, MappedFrame, OutputBuffer, OutputState};

/// 默认平面对齐 (字节)
pub const DEFAULT_ALIGNMENT: usize = 64;

#[derive(Debug, Clone, Copy)]
struct PlaneLayout {
    offset: usize,
    stride: usize,
    rows: usize,
    pixel_stride: usize,
}

#[derive(Debug, Default)]
struct MapCount {
    readers: usize,
    writer: bool,
}

/// 缓冲区底层内存, 分配后地址不变, 由所有映射共享
#[derive(Debug)]
struct SharedMemory {
    ptr: NonNull<u8>,
    len: usize,
    maps: Mutex<MapCount>,
}

// SAFETY: 内存只经由映射访问, 写映射同一时刻至多一个; 内存在最后一个
// `Arc<SharedMemory>` 丢弃时才释放.
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    fn allocate(len: usize) -> HvResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| HvError::AllocationFailed(format!("{len} 字节: {e}")))?;
        data.resize(len, 0u8);
        let raw = Box::into_raw(data.into_boxed_slice());
        let ptr = NonNull::new(raw.cast::<u8>())
            .ok_or_else(|| HvError::AllocationFailed("空指针".into()))?;
        Ok(Self {
            ptr,
            len,
            maps: Mutex::new(MapCount::default()),
        })
    }

    fn acquire(&self, flags: MapFlags) -> HvResult<()> {
        let mut maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        if flags.contains(MapFlags::WRITE) {
            if maps.writer {
                return Err(HvError::MapFailed("缓冲区已被写映射".into()));
            }
            maps.writer = true;
        } else {
            maps.readers += 1;
        }
        Ok(())
    }

    fn release(&self, flags: MapFlags) {
        let mut maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        if flags.contains(MapFlags::WRITE) {
            maps.writer = false;
        } else {
            maps.readers = maps.readers.saturating_sub(1);
        }
    }

    /// 当前映射数 (读, 写)
    fn map_count(&self) -> (usize, bool) {
        let maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        (maps.readers, maps.writer)
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // SAFETY: 指针与长度来自 allocate 中的 Box::into_raw, 且只释放一次
        drop(unsafe { Box::from_raw(slice) });
    }
}

/// 堆内存输出缓冲区
#[derive(Debug)]
pub struct SystemBuffer {
    format: PixelFormat,
    width: usize,
    height: usize,
    base: usize,
    planes: Vec<PlaneLayout>,
    memory: Arc<SharedMemory>,
}

impl SystemBuffer {
    /// 按格式与尺寸分配缓冲区
    ///
    /// # 参数
    /// - `alignment`: 平面基址与跨距的对齐值, 必须为 2 的幂
    pub fn new(
        format: PixelFormat,
        width: usize,
        height: usize,
        alignment: usize,
    ) -> HvResult<Self> {
        if !alignment.is_power_of_two() {
            return Err(HvError::InvalidArgument(format!(
                "对齐值必须为 2 的幂: {alignment}"
            )));
        }

        let mut planes = Vec::with_capacity(format.plane_count());
        let mut total = 0usize;
        for plane in 0..format.plane_count() {
            let linesize = format.plane_linesize(plane, width).unwrap_or(0);
            let rows = format.plane_height(plane, height).unwrap_or(0);
            let stride = linesize.next_multiple_of(alignment);
            planes.push(PlaneLayout {
                offset: total,
                stride,
                rows,
                pixel_stride: format.bytes_per_component(),
            });
            total += (stride * rows).next_multiple_of(alignment);
        }

        let memory = SharedMemory::allocate(total + alignment)
            .map_err(|e| HvError::AllocationFailed(format!("{format} {width}x{height}: {e}")))?;
        let base = memory.ptr.as_ptr().align_offset(alignment);
        if base >= alignment {
            return Err(HvError::AllocationFailed("无法对齐缓冲区基址".into()));
        }

        Ok(Self {
            format,
            width,
            height,
            base,
            planes,
            memory: Arc::new(memory),
        })
    }

    /// 像素格式
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// 宽度 (像素)
    pub fn width(&self) -> usize {
        self.width
    }

    /// 高度 (像素)
    pub fn height(&self) -> usize {
        self.height
    }

    /// 当前读映射数与是否存在写映射
    pub fn map_count(&self) -> (usize, bool) {
        self.memory.map_count()
    }
}

impl OutputBuffer for SystemBuffer {
    fn map(&self, flags: MapFlags) -> HvResult<Box<dyn MappedFrame>> {
        self.memory.acquire(flags)?;
        Ok(Box::new(SystemMapping {
            memory: Arc::clone(&self.memory),
            base: self.base,
            planes: self.planes.clone(),
            flags,
        }))
    }
}

/// 缓冲区的一个映射, 丢弃时归还映射计数
struct SystemMapping {
    memory: Arc<SharedMemory>,
    base: usize,
    planes: Vec<PlaneLayout>,
    flags: MapFlags,
}

impl SystemMapping {
    /// 平面起始指针与字节数
    fn plane_raw(&self, plane: usize) -> (*mut u8, usize) {
        let layout = &self.planes[plane];
        let start = self.base + layout.offset;
        // SAFETY: 布局在构造时按 total + alignment 计算, base < alignment,
        // 因此 start + stride × rows 不超过分配长度
        let ptr = unsafe { self.memory.ptr.as_ptr().add(start) };
        (ptr, layout.stride * layout.rows)
    }
}

impl MappedFrame for SystemMapping {
    fn n_planes(&self) -> usize {
        self.planes.len()
    }

    fn plane_stride(&self, plane: usize) -> usize {
        self.planes[plane].stride
    }

    fn plane_rows(&self, plane: usize) -> usize {
        self.planes[plane].rows
    }

    fn pixel_stride(&self, plane: usize) -> usize {
        self.planes[plane].pixel_stride
    }

    fn plane_data(&self, plane: usize) -> &[u8] {
        let (ptr, len) = self.plane_raw(plane);
        // SAFETY: 范围位于分配内; 写方只在图像交付前写入
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }

    fn plane_data_mut(&mut self, plane: usize) -> &mut [u8] {
        debug_assert!(self.flags.contains(MapFlags::WRITE));
        let (ptr, len) = self.plane_raw(plane);
        // SAFETY: 范围位于分配内, 写映射同一时刻至多一个
        unsafe { std::slice::from_raw_parts_mut(ptr, len) }
    }

    fn plane_ptr(&mut self, plane: usize) -> Option<NonNull<u8>> {
        NonNull::new(self.plane_raw(plane).0)
    }
}

impl Drop for SystemMapping {
    fn drop(&mut self) {
        self.memory.release(self.flags);
    }
}

/// 系统内存宿主管线
///
/// 记录最近一次协商结果与收到的警告, 便于宿主查询.
pub struct SystemMemoryPipeline {
    alignment: usize,
    negotiated: Mutex<Option<OutputState>>,
    warnings: Mutex<Vec<String>>,
}

impl SystemMemoryPipeline {
    /// 使用默认对齐创建
    pub fn new() -> Self {
        Self::with_alignment(DEFAULT_ALIGNMENT)
    }

    /// 使用指定对齐创建
    pub fn with_alignment(alignment: usize) -> Self {
        Self {
            alignment,
            negotiated: Mutex::new(None),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// 最近一次协商的输出状态
    pub fn negotiated(&self) -> Option<OutputState> {
        *self.negotiated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 收到的全部警告
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for SystemMemoryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl HostPipeline for SystemMemoryPipeline {
    fn negotiate(&self, state: &OutputState) -> HvResult<()> {
        info!(
            "输出协商: {} {}x{} @ {}",
            state.format, state.width, state.height, state.frame_rate
        );
        *self.negotiated.lock().unwrap_or_else(PoisonError::into_inner) = Some(*state);
        Ok(())
    }

    fn allocate_output_buffer(&self, state: &OutputState) -> HvResult<Arc<dyn OutputBuffer>> {
        let buffer = SystemBuffer::new(state.format, state.width, state.height, self.alignment)?;
        debug!(
            "分配输出缓冲区: {} {}x{}",
            state.format, state.width, state.height
        );
        Ok(Arc::new(buffer))
    }

    fn post_warning(&self, message: &str) {
        log::warn!("{message}");
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_平面对齐() {
        let buf = SystemBuffer::new(PixelFormat::Yuv420p, 33, 17, 32).unwrap();
        let mapped = buf.map(MapFlags::READWRITE).unwrap();
        assert_eq!(mapped.n_planes(), 3);
        for plane in 0..3 {
            assert_eq!(mapped.plane_stride(plane) % 32, 0);
            assert_eq!(mapped.plane_data(plane).as_ptr() as usize % 32, 0);
        }
        assert_eq!(mapped.plane_stride(0), 64);
        assert_eq!(mapped.plane_rows(0), 17);
        assert_eq!(mapped.plane_rows(1), 9);
        assert_eq!(mapped.pixel_stride(0), 1);
    }

    #[test]
    fn test_写映射互斥_读映射可并存() {
        let buf = SystemBuffer::new(PixelFormat::Gray8, 16, 16, 16).unwrap();
        let mut writer = buf.map(MapFlags::READWRITE).unwrap();
        assert!(matches!(buf.map(MapFlags::WRITE), Err(HvError::MapFailed(_))));

        writer.plane_data_mut(0)[5] = 0x42;
        let reader = buf.map(MapFlags::READ).unwrap();
        let second_reader = buf.map(MapFlags::READ).unwrap();
        assert_eq!(reader.plane_data(0)[5], 0x42);
        assert_eq!(buf.map_count(), (2, true));

        writer.unmap();
        assert_eq!(buf.map_count(), (2, false));
        assert!(buf.map(MapFlags::WRITE).is_ok());
        drop(reader);
        drop(second_reader);
        assert_eq!(buf.map_count(), (0, false));
    }

    #[test]
    fn test_平面指针按偏移计算() {
        let buf = SystemBuffer::new(PixelFormat::Yuv420p, 64, 32, 32).unwrap();
        let mut mapped = buf.map(MapFlags::READWRITE).unwrap();
        let ptrs: Vec<_> = (0..3).map(|p| mapped.plane_ptr(p).unwrap()).collect();
        // 先取全部指针再逐个写入
        for (plane, ptr) in ptrs.iter().enumerate() {
            // SAFETY: 指针指向平面起始, 平面至少 1 字节
            unsafe { ptr.as_ptr().write(plane as u8 + 1) };
        }
        assert_eq!(mapped.plane_data(0)[0], 1);
        assert_eq!(mapped.plane_data(1)[0], 2);
        assert_eq!(mapped.plane_data(2)[0], 3);
        assert_eq!(
            ptrs[1].as_ptr() as usize - ptrs[0].as_ptr() as usize,
            mapped.plane_stride(0) * mapped.plane_rows(0)
        );
    }

    #[test]
    fn test_缓冲区丢弃后映射仍有效() {
        let buf = Arc::new(SystemBuffer::new(PixelFormat::Gray8, 8, 8, 8).unwrap());
        let mut mapped = buf.map(MapFlags::READWRITE).unwrap();
        drop(buf);
        mapped.plane_data_mut(0)[63] = 9;
        assert_eq!(mapped.plane_data(0)[63], 9);
    }

    #[test]
    fn test_写入后解除映射数据保留() {
        let buf = SystemBuffer::new(PixelFormat::Yuv420p10le, 8, 8, 16).unwrap();
        {
            let mut mapped = buf.map(MapFlags::WRITE).unwrap();
            assert_eq!(mapped.pixel_stride(0), 2);
            mapped.plane_data_mut(2)[0] = 0x5A;
        }
        let mapped = buf.map(MapFlags::READ).unwrap();
        assert_eq!(mapped.plane_data(2)[0], 0x5A);
    }

    #[test]
    fn test_非法对齐() {
        assert!(SystemBuffer::new(PixelFormat::Gray8, 4, 4, 24).is_err());
    }

    #[test]
    fn test_协商记录与警告() {
        let pipeline = SystemMemoryPipeline::new();
        let state = OutputState {
            format: PixelFormat::Yuv444p,
            width: 64,
            height: 32,
            frame_rate: hvdec_core::Rational::new(25, 1),
        };
        pipeline.negotiate(&state).unwrap();
        assert_eq!(pipeline.negotiated(), Some(state));
        pipeline.post_warning("测试警告");
        assert_eq!(pipeline.warnings(), vec!["测试警告".to_string()]);
    }
}
