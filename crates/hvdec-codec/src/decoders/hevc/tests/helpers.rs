use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use hvdec_core::{ChromaLayout, HvError, HvResult, Rational};

use crate::engine::{
    BufferAllocation, DecodeEngine, DecodeStatus, DecodedPicture, EngineFault, PictureAllocator,
    PictureSlot, PictureSpec, PlaneBinding, PlaneTag,
};
use crate::frame::VideoFrame;
use crate::host::{
    HostPipeline, MapFlags, MappedFrame, OutputBuffer, OutputState, SystemMemoryPipeline,
};
use crate::parsers::h265::{ConfigurationRecord, ParameterSetArray};

use super::super::{DecoderSettings, HevcDecoder};

/// 引擎收到的一次输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    Nal(Vec<u8>, i64),
    Data(Vec<u8>, i64),
}

/// 预先编排的一幅图像
#[derive(Debug, Clone)]
pub struct ScriptedPicture {
    pub spec: PictureSpec,
    /// 各平面填充的采样值
    pub fill: [u16; 3],
    /// 为 true 时先留在引擎内部, 下一次有输入时才输出
    pub delayed: bool,
    /// 为 true 时输出后引擎仍持有图像, 直到码流结束或重置
    pub retain_after_output: bool,
}

impl ScriptedPicture {
    pub fn new(spec: PictureSpec, fill: [u16; 3]) -> Self {
        Self {
            spec,
            fill,
            delayed: false,
            retain_after_output: false,
        }
    }

    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    pub fn retained(mut self) -> Self {
        self.retain_after_output = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub pushes: Vec<Push>,
    pub end_of_nal: usize,
    pub end_of_stream: usize,
    pub resets: usize,
    pub engines_created: usize,
    pub threads: Option<usize>,
    pub max_frames: Option<usize>,
    pub gets: usize,
    pub bound: usize,
    pub releases: usize,
    pub warnings: VecDeque<EngineFault>,
    pub script: VecDeque<ScriptedPicture>,
    pub fail_next_step: Option<EngineFault>,
    pub reject_push: Option<EngineFault>,
    pending_input: bool,
    last_pts: i64,
}

/// 测试侧持有的引擎状态句柄
#[derive(Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn script(&self, picture: ScriptedPicture) {
        self.state().script.push_back(picture);
    }

    pub fn pushes(&self) -> Vec<Push> {
        self.state().pushes.clone()
    }

    pub fn nal_pushes(&self) -> Vec<(Vec<u8>, i64)> {
        self.pushes()
            .into_iter()
            .filter_map(|push| match push {
                Push::Nal(data, pts) => Some((data, pts)),
                Push::Data(..) => None,
            })
            .collect()
    }

    pub fn clear_pushes(&self) {
        self.state().pushes.clear();
    }
}

#[derive(Default)]
pub struct MockSlot {
    planes: [Option<PlaneBinding>; 3],
}

impl PictureSlot for MockSlot {
    fn set_plane(&mut self, plane: usize, binding: PlaneBinding) {
        self.planes[plane] = Some(binding);
    }

    fn plane_tag(&self, plane: usize) -> Option<PlaneTag> {
        self.planes[plane].as_ref().and_then(|b| b.tag.clone())
    }
}

enum PlaneData {
    Owned(Vec<u8>, usize),
    Bound(NonNull<u8>, usize, usize),
}

pub struct MockPicture {
    spec: PictureSpec,
    retain: bool,
    pts: i64,
    slot: MockSlot,
    planes: Vec<PlaneData>,
    allocator: Option<Arc<dyn PictureAllocator>>,
    state: MockHandle,
}

// SAFETY: 绑定平面指向的映射在 release_buffer 之前有效, 而 release_buffer
// 只在最后一个引用丢弃时调用; 交付后平面只读.
unsafe impl Send for MockPicture {}
unsafe impl Sync for MockPicture {}

/// 图像平面的可见尺寸
fn plane_dims(spec: &PictureSpec, plane: usize) -> (usize, usize) {
    if plane == 0 {
        return (spec.visible_width, spec.visible_height);
    }
    let (sub_h, sub_v) = spec.chroma.subsampling();
    (
        spec.visible_width.div_ceil(1 << sub_h),
        spec.visible_height.div_ceil(1 << sub_v),
    )
}

fn fill_row(row: &mut [u8], value: u16, bytes_per_sample: usize) {
    for sample in row.chunks_exact_mut(bytes_per_sample) {
        if bytes_per_sample == 2 {
            sample.copy_from_slice(&value.to_le_bytes());
        } else {
            sample[0] = value as u8;
        }
    }
}

impl MockPicture {
    fn produce(
        scripted: &ScriptedPicture,
        pts: i64,
        allocator: Option<Arc<dyn PictureAllocator>>,
        state: MockHandle,
    ) -> Self {
        let spec = scripted.spec;
        let mut slot = MockSlot::default();
        let allocation = match &allocator {
            Some(allocator) => allocator.get_buffer(&spec, &mut slot),
            None => BufferAllocation::Default,
        };
        {
            let mut st = state.state();
            st.gets += 1;
            if allocation == BufferAllocation::Bound {
                st.bound += 1;
            }
        }

        let mut planes = Vec::with_capacity(spec.chroma.plane_count());
        for plane in 0..spec.chroma.plane_count() {
            let (width, height) = plane_dims(&spec, plane);
            let bps = if spec.bit_depth(plane) > 8 { 2 } else { 1 };
            let value = scripted.fill[plane];
            let bound = slot.planes[plane]
                .as_ref()
                .filter(|_| allocation == BufferAllocation::Bound)
                .map(|b| (b.data, b.stride, b.rows));
            match bound {
                Some((data, stride, rows)) => {
                    assert!(rows >= height && stride >= width * bps);
                    for y in 0..height {
                        // SAFETY: 行 y 位于 stride × rows 的映射范围内
                        let row = unsafe {
                            std::slice::from_raw_parts_mut(
                                data.as_ptr().add(y * stride),
                                width * bps,
                            )
                        };
                        fill_row(row, value, bps);
                    }
                    planes.push(PlaneData::Bound(data, stride, rows));
                }
                None => {
                    let stride = width * bps;
                    let mut data = vec![0u8; stride * height];
                    for row in data.chunks_exact_mut(stride) {
                        fill_row(row, value, bps);
                    }
                    planes.push(PlaneData::Owned(data, stride));
                }
            }
        }

        Self {
            spec,
            retain: scripted.retain_after_output,
            pts,
            slot,
            planes,
            allocator,
            state,
        }
    }
}

impl DecodedPicture for MockPicture {
    fn chroma(&self) -> ChromaLayout {
        self.spec.chroma
    }

    fn width(&self, plane: usize) -> usize {
        plane_dims(&self.spec, plane).0
    }

    fn height(&self, plane: usize) -> usize {
        plane_dims(&self.spec, plane).1
    }

    fn bit_depth(&self, plane: usize) -> u32 {
        self.spec.bit_depth(plane)
    }

    fn plane(&self, plane: usize) -> (&[u8], usize) {
        match &self.planes[plane] {
            PlaneData::Owned(data, stride) => (data.as_slice(), *stride),
            PlaneData::Bound(data, stride, rows) => {
                // SAFETY: 映射在 release_buffer (Drop) 之前有效
                let slice = unsafe { std::slice::from_raw_parts(data.as_ptr(), stride * rows) };
                (slice, *stride)
            }
        }
    }

    fn pts(&self) -> i64 {
        self.pts
    }

    fn plane_tag(&self, plane: usize) -> Option<PlaneTag> {
        self.slot.plane_tag(plane)
    }
}

impl Drop for MockPicture {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            allocator.release_buffer(&mut self.slot);
        }
        self.state.state().releases += 1;
    }
}

/// 交付给解码桥的图像引用, 引擎可同时保留另一份
struct SharedPicture(Arc<MockPicture>);

impl DecodedPicture for SharedPicture {
    fn chroma(&self) -> ChromaLayout {
        self.0.chroma()
    }

    fn width(&self, plane: usize) -> usize {
        self.0.width(plane)
    }

    fn height(&self, plane: usize) -> usize {
        self.0.height(plane)
    }

    fn bit_depth(&self, plane: usize) -> u32 {
        self.0.bit_depth(plane)
    }

    fn plane(&self, plane: usize) -> (&[u8], usize) {
        self.0.plane(plane)
    }

    fn pts(&self) -> i64 {
        self.0.pts()
    }

    fn plane_tag(&self, plane: usize) -> Option<PlaneTag> {
        self.0.plane_tag(plane)
    }
}

/// 按脚本产出图像的假引擎
pub struct MockEngine {
    state: MockHandle,
    allocator: Option<Arc<dyn PictureAllocator>>,
    held: Vec<Arc<MockPicture>>,
    output: VecDeque<Arc<MockPicture>>,
    /// 已交付但仍被引擎引用的图像
    retained: Vec<Arc<MockPicture>>,
}

impl MockEngine {
    pub fn new(state: MockHandle) -> Self {
        state.state().engines_created += 1;
        Self {
            state,
            allocator: None,
            held: Vec::new(),
            output: VecDeque::new(),
            retained: Vec::new(),
        }
    }

    fn record_push(&mut self, push: Push) -> Result<(), EngineFault> {
        let mut st = self.state.state();
        if let Some(fault) = st.reject_push.take() {
            return Err(fault);
        }
        st.last_pts = match &push {
            Push::Nal(_, pts) | Push::Data(_, pts) => *pts,
        };
        st.pushes.push(push);
        st.pending_input = true;
        Ok(())
    }
}

impl DecodeEngine for MockEngine {
    fn version(&self) -> String {
        "mock-engine 1.0".into()
    }

    fn set_worker_threads(&mut self, threads: usize) -> Result<(), EngineFault> {
        self.state.state().threads = Some(threads);
        Ok(())
    }

    fn set_max_parallel_frames(&mut self, frames: usize) {
        self.state.state().max_frames = Some(frames);
    }

    fn set_allocator(&mut self, allocator: Arc<dyn PictureAllocator>) {
        self.allocator = Some(allocator);
    }

    fn push_nal(&mut self, data: &[u8], pts: i64) -> Result<(), EngineFault> {
        self.record_push(Push::Nal(data.to_vec(), pts))
    }

    fn push_data(&mut self, data: &[u8], pts: i64) -> Result<(), EngineFault> {
        self.record_push(Push::Data(data.to_vec(), pts))
    }

    fn push_end_of_nal(&mut self) {
        self.state.state().end_of_nal += 1;
    }

    fn push_end_of_stream(&mut self) -> Result<(), EngineFault> {
        self.state.state().end_of_stream += 1;
        self.output.extend(self.held.drain(..));
        self.retained.clear();
        Ok(())
    }

    fn decode_step(&mut self) -> DecodeStatus {
        let (scripted, pts) = {
            let mut st = self.state.state();
            if let Some(fault) = st.fail_next_step.take() {
                return DecodeStatus::Failed(fault);
            }
            if !st.pending_input {
                return if self.output.is_empty() {
                    DecodeStatus::WaitingForInput
                } else {
                    DecodeStatus::PictureReady
                };
            }
            st.pending_input = false;
            (st.script.pop_front(), st.last_pts)
        };

        self.output.extend(self.held.drain(..));
        if let Some(scripted) = scripted {
            let picture = Arc::new(MockPicture::produce(
                &scripted,
                pts,
                self.allocator.clone(),
                self.state.clone(),
            ));
            if scripted.delayed {
                self.held.push(picture);
            } else {
                self.output.push_back(picture);
            }
        }
        DecodeStatus::MoreWork
    }

    fn next_warning(&mut self) -> Option<EngineFault> {
        self.state.state().warnings.pop_front()
    }

    fn next_picture(&mut self) -> Option<Box<dyn DecodedPicture>> {
        let picture = self.output.pop_front()?;
        if picture.retain {
            self.retained.push(Arc::clone(&picture));
        }
        Some(Box::new(SharedPicture(picture)))
    }

    fn reset(&mut self) {
        self.held.clear();
        self.output.clear();
        self.retained.clear();
        let mut st = self.state.state();
        st.resets += 1;
        st.pending_input = false;
    }
}

pub fn spec(chroma: ChromaLayout, width: usize, height: usize, bit_depths: [u32; 3]) -> PictureSpec {
    PictureSpec {
        width,
        height,
        visible_width: width,
        visible_height: height,
        alignment: 16,
        chroma,
        bit_depths,
    }
}

pub fn spec_420_8bit(width: usize, height: usize) -> PictureSpec {
    spec(ChromaLayout::Yuv420, width, height, [8; 3])
}

pub fn build_test_settings() -> DecoderSettings {
    DecoderSettings {
        max_threads: 2,
        ..DecoderSettings::default()
    }
}

pub fn build_test_decoder_with(
    settings: DecoderSettings,
    host: Arc<dyn HostPipeline>,
) -> (HevcDecoder, MockHandle) {
    let handle = MockHandle::default();
    let engine_state = handle.clone();
    let factory = move || -> HvResult<Box<dyn DecodeEngine>> {
        Ok(Box::new(MockEngine::new(engine_state.clone())))
    };
    let decoder = HevcDecoder::new(settings, host, factory).unwrap();
    (decoder, handle)
}

/// 已启动的会话, 宿主为默认对齐的系统内存管线
pub fn build_started_decoder() -> (HevcDecoder, MockHandle, Arc<SystemMemoryPipeline>) {
    use crate::decoder::Decoder;

    let host = Arc::new(SystemMemoryPipeline::new());
    let (mut decoder, handle) = build_test_decoder_with(build_test_settings(), host.clone());
    decoder.start().unwrap();
    (decoder, handle, host)
}

/// 测试宿主注入的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFault {
    /// 第一次协商失败
    NegotiateOnce,
    /// 第一次分配缓冲区失败
    AllocateOnce,
    /// 读写映射的亮度行数少一行
    ShortRows,
    /// 读写映射的亮度跨距减半
    NarrowPitch,
    /// 读写映射的平面基址偏移一个字节
    ShiftedBase,
}

/// 读写映射的计数, 用于核对解除映射次数
#[derive(Debug, Default)]
pub struct MapCounter {
    pub mapped: AtomicUsize,
    pub unmapped: AtomicUsize,
}

impl MapCounter {
    pub fn counts(&self) -> (usize, usize) {
        (
            self.mapped.load(Ordering::SeqCst),
            self.unmapped.load(Ordering::SeqCst),
        )
    }
}

/// 在系统内存管线外包一层故障注入的宿主
pub struct FaultyHost {
    inner: SystemMemoryPipeline,
    fault: HostFault,
    remaining: AtomicUsize,
    pub maps: Arc<MapCounter>,
}

impl FaultyHost {
    pub fn new(fault: HostFault) -> Self {
        Self {
            inner: SystemMemoryPipeline::new(),
            fault,
            remaining: AtomicUsize::new(1),
            maps: Arc::default(),
        }
    }

    fn fire_once(&self, fault: HostFault) -> bool {
        self.fault == fault
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

impl HostPipeline for FaultyHost {
    fn negotiate(&self, state: &OutputState) -> HvResult<()> {
        if self.fire_once(HostFault::NegotiateOnce) {
            return Err(HvError::Negotiation("宿主拒绝协商".into()));
        }
        self.inner.negotiate(state)
    }

    fn allocate_output_buffer(&self, state: &OutputState) -> HvResult<Arc<dyn OutputBuffer>> {
        if self.fire_once(HostFault::AllocateOnce) {
            return Err(HvError::AllocationFailed("宿主缓冲池耗尽".into()));
        }
        let inner = self.inner.allocate_output_buffer(state)?;
        Ok(Arc::new(SkewedBuffer {
            inner,
            fault: self.fault,
            maps: Arc::clone(&self.maps),
        }))
    }

    fn post_warning(&self, message: &str) {
        self.inner.post_warning(message);
    }
}

#[derive(Debug)]
struct SkewedBuffer {
    inner: Arc<dyn OutputBuffer>,
    fault: HostFault,
    maps: Arc<MapCounter>,
}

impl OutputBuffer for SkewedBuffer {
    fn map(&self, flags: MapFlags) -> HvResult<Box<dyn MappedFrame>> {
        let inner = self.inner.map(flags)?;
        // 只有解码桥以读写方式映射, 拷贝路径与读取帧不受影响
        if flags != MapFlags::READWRITE {
            return Ok(inner);
        }
        self.maps.mapped.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SkewedMapping {
            inner,
            fault: self.fault,
            maps: Arc::clone(&self.maps),
        }))
    }
}

struct SkewedMapping {
    inner: Box<dyn MappedFrame>,
    fault: HostFault,
    maps: Arc<MapCounter>,
}

impl MappedFrame for SkewedMapping {
    fn n_planes(&self) -> usize {
        self.inner.n_planes()
    }

    fn plane_stride(&self, plane: usize) -> usize {
        let stride = self.inner.plane_stride(plane);
        if plane == 0 && self.fault == HostFault::NarrowPitch {
            stride / 2
        } else {
            stride
        }
    }

    fn plane_rows(&self, plane: usize) -> usize {
        let rows = self.inner.plane_rows(plane);
        if plane == 0 && self.fault == HostFault::ShortRows {
            rows - 1
        } else {
            rows
        }
    }

    fn pixel_stride(&self, plane: usize) -> usize {
        self.inner.pixel_stride(plane)
    }

    fn plane_data(&self, plane: usize) -> &[u8] {
        self.inner.plane_data(plane)
    }

    fn plane_data_mut(&mut self, plane: usize) -> &mut [u8] {
        self.inner.plane_data_mut(plane)
    }

    fn plane_ptr(&mut self, plane: usize) -> Option<NonNull<u8>> {
        let ptr = self.inner.plane_ptr(plane)?;
        if self.fault == HostFault::ShiftedBase {
            NonNull::new(ptr.as_ptr().wrapping_add(1))
        } else {
            Some(ptr)
        }
    }
}

impl Drop for SkewedMapping {
    fn drop(&mut self) {
        self.maps.unmapped.fetch_add(1, Ordering::SeqCst);
    }
}

/// 构造配置记录: 一个 VPS/SPS/PPS 之类的数组, 内含给定 NAL
pub fn build_record(version: u8, length_size: usize, units: &[&[u8]]) -> Bytes {
    let record = ConfigurationRecord {
        version,
        general_profile_space: 0,
        general_tier_flag: false,
        general_profile_idc: 1,
        general_level_idc: 93,
        chroma_format_idc: 1,
        bit_depth_luma: 8,
        bit_depth_chroma: 8,
        length_size,
        arrays: vec![ParameterSetArray {
            header: 0x80 | 32,
            units: units.iter().map(|u| Bytes::copy_from_slice(u)).collect(),
        }],
    };
    Bytes::from(record.build().unwrap())
}

/// 按长度前缀拼接 NAL
pub fn length_prefixed(units: &[&[u8]], length_size: usize) -> Bytes {
    let mut out = Vec::new();
    for unit in units {
        crate::parsers::h265::append_length_prefixed(&mut out, unit, length_size).unwrap();
    }
    Bytes::from(out)
}

/// 读出帧的一个平面 (只取可见宽度对应的字节)
pub fn read_plane(frame: &VideoFrame, plane: usize, row_bytes: usize) -> Vec<Vec<u8>> {
    let view = frame.buffer.map(MapFlags::READ).unwrap();
    let stride = view.plane_stride(plane);
    let rows = view.plane_rows(plane);
    let data = view.plane_data(plane);
    (0..rows)
        .map(|y| data[y * stride..y * stride + row_bytes].to_vec())
        .collect()
}

pub fn rate(num: i32, den: i32) -> Rational {
    Rational::new(num, den)
}
