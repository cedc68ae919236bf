//! H.265/HEVC 解码会话.
//!
//! 连接外部解码引擎与宿主管线:
//! - 参数集注入: 解析带外配置记录并把参数集送入引擎 (`ingest`)
//! - NAL 解复用: 按码流约定把每个数据块切分并送入引擎 (`demux`)
//! - 解码驱动: 推动引擎并转发警告 (`driver`)
//! - 零拷贝桥接: 引擎直接写入宿主缓冲区 (`bridge`)
//! - 格式解析与输出协商 (`format`, `negotiate`)
//! - 拷贝路径: 零拷贝不可用时的平面拷贝/位深转换 (`copy`)
//!
//! 数据流:
//! ```text
//! Packet → demux → 引擎 → 图像 ─┬─ FrameRef (零拷贝) ──→ VideoFrame
//!                               └─ format + copy ──────→ VideoFrame
//! ```

pub mod bridge;
pub mod copy;
pub mod demux;
pub mod driver;
pub mod format;
pub mod ingest;
pub mod negotiate;
pub mod settings;

use std::sync::Arc;

use bytes::Bytes;
use hvdec_core::{HvError, HvResult};
use log::{debug, info, trace};

use crate::codec_parameters::{CodecParameters, StreamFormatHint};
use crate::decoder::Decoder;
use crate::engine::{DecodeEngine, DecodedPicture};
use crate::frame::VideoFrame;
use crate::host::{HostPipeline, OutputState};
use crate::packet::Packet;

pub use bridge::{BridgeStatsSnapshot, FrameRef, ZeroCopyAllocator};
pub use demux::Demuxed;
pub use format::resolve_format;
pub use ingest::{IngestOutcome, detect_mode};
pub use negotiate::OutputNegotiator;
pub use settings::{DecoderSettings, StreamMode};

/// 未解析配置记录前的默认长度前缀字节数
pub const DEFAULT_LENGTH_SIZE: usize = 4;

/// 解码引擎工厂, 每次 `start()` 创建一个新引擎
pub trait EngineFactory: Send {
    /// 创建引擎实例
    fn create(&self) -> HvResult<Box<dyn DecodeEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> HvResult<Box<dyn DecodeEngine>> + Send,
{
    fn create(&self) -> HvResult<Box<dyn DecodeEngine>> {
        self()
    }
}

/// HEVC 解码会话
pub struct HevcDecoder {
    settings: DecoderSettings,
    host: Arc<dyn HostPipeline>,
    factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn DecodeEngine>>,
    negotiator: Arc<OutputNegotiator>,
    allocator: Arc<ZeroCopyAllocator>,
    mode: StreamMode,
    length_size: usize,
    codec_data: Option<Bytes>,
    worker_threads: usize,
    eos_pushed: bool,
}

impl HevcDecoder {
    /// 创建会话 (尚未启动)
    pub fn new(
        settings: DecoderSettings,
        host: Arc<dyn HostPipeline>,
        factory: impl EngineFactory + 'static,
    ) -> HvResult<Self> {
        settings.validate()?;
        let negotiator = Arc::new(OutputNegotiator::new(
            Arc::clone(&host),
            settings.frame_rate_override(),
        ));
        let allocator = Arc::new(ZeroCopyAllocator::new(
            Arc::clone(&host),
            Arc::clone(&negotiator),
        ));
        Ok(Self {
            mode: settings.mode,
            settings,
            host,
            factory: Box::new(factory),
            engine: None,
            negotiator,
            allocator,
            length_size: DEFAULT_LENGTH_SIZE,
            codec_data: None,
            worker_threads: 0,
            eos_pushed: false,
        })
    }

    /// 会话配置
    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// 当前码流约定
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// 当前长度前缀字节数
    pub fn length_size(&self) -> usize {
        self.length_size
    }

    /// 启动的工作线程数 (未启动时为 0)
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// 是否已启动
    pub fn is_started(&self) -> bool {
        self.engine.is_some()
    }

    /// 当前已协商的输出状态
    pub fn output_state(&self) -> Option<OutputState> {
        self.negotiator.current()
    }

    /// 零拷贝桥接统计
    pub fn bridge_stats(&self) -> BridgeStatsSnapshot {
        self.allocator.stats()
    }

    fn engine_mut(&mut self) -> HvResult<&mut (dyn DecodeEngine + 'static)> {
        self.engine.as_deref_mut().ok_or(HvError::NotStarted)
    }

    fn replay_codec_data(&mut self) -> HvResult<()> {
        let Some(data) = self.codec_data.clone() else {
            return Ok(());
        };
        let host = Arc::clone(&self.host);
        let engine = self.engine_mut()?;
        engine
            .push_data(&data, 0)
            .map_err(|f| f.into_error("推送配置数据失败"))?;
        engine.push_end_of_nal();
        driver::pump(engine, "解码配置数据失败")?;
        driver::drain_warnings(engine, host.as_ref());
        driver::discard_pictures(engine);
        debug!("重放配置数据 {} 字节", data.len());
        Ok(())
    }

    /// 把取出的图像转换为宿主帧, 并把图像归还引擎
    fn deliver(
        &mut self,
        picture: Box<dyn DecodedPicture>,
        frame_number: u32,
    ) -> HvResult<VideoFrame> {
        let result = match bridge::frame_ref_of(picture.as_ref()) {
            Some(frame_ref) => {
                let output = frame_ref.output();
                frame_ref
                    .take_buffer()
                    .map(|buffer| VideoFrame {
                        buffer,
                        pixel_format: output.format,
                        width: output.width,
                        height: output.height,
                        pts: picture.pts(),
                        frame_number: frame_ref.frame_number(),
                        frame_rate: output.frame_rate,
                        zero_copy: true,
                    })
                    .ok_or_else(|| HvError::Internal("零拷贝图像已交付过".into()))
            }
            None => copy::copy_picture(
                picture.as_ref(),
                &self.negotiator,
                self.host.as_ref(),
                frame_number,
            ),
        };
        self.engine_mut()?.release_picture(picture);
        result
    }
}

impl Decoder for HevcDecoder {
    fn name(&self) -> &str {
        "hevc"
    }

    fn start(&mut self) -> HvResult<()> {
        self.stop();
        let mut engine = self.factory.create()?;
        let threads = self.settings.worker_threads();
        engine.set_max_parallel_frames(threads);
        engine
            .set_worker_threads(threads)
            .map_err(|f| f.into_error("启动工作线程失败"))?;
        engine.set_allocator(self.allocator.clone());
        info!("使用 {} 解码引擎, {threads} 个工作线程", engine.version());

        self.engine = Some(engine);
        self.worker_threads = threads;
        self.mode = self.settings.mode;
        self.length_size = DEFAULT_LENGTH_SIZE;
        self.eos_pushed = false;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(engine) = self.engine.take() {
            drop(engine);
            let stats = self.allocator.stats();
            debug!(
                "解码会话停止: 零拷贝 {} 次, 回退 {} 次, 释放 {} 次",
                stats.bound, stats.fallbacks, stats.released
            );
        }
        self.negotiator.reset();
        self.codec_data = None;
        self.worker_threads = 0;
    }

    fn set_format(&mut self, params: &CodecParameters) -> HvResult<()> {
        // 配置数据无效时帧率同样生效
        self.negotiator.set_input_frame_rate(params.frame_rate);
        let host = Arc::clone(&self.host);
        let length_size = self.length_size;
        let engine = self.engine_mut()?;
        let outcome = match &params.extra_data {
            Some(data) => Some(ingest::ingest(
                engine,
                host.as_ref(),
                data,
                params.stream_format,
                length_size,
            )?),
            None => None,
        };

        if let Some(outcome) = outcome {
            self.codec_data = params.extra_data.clone();
            self.mode = outcome.mode;
            self.length_size = outcome.length_size;
        } else if params.stream_format == Some(StreamFormatHint::ByteStream) {
            debug!("宿主声明原始字节流");
            self.mode = StreamMode::Raw;
        }
        Ok(())
    }

    fn handle_packet(&mut self, packet: &Packet) -> HvResult<Option<VideoFrame>> {
        let mode = self.mode;
        let length_size = self.length_size;
        let skip_eos = packet.is_empty() && self.eos_pushed;
        let engine = self.engine_mut()?;
        if !skip_eos {
            let demuxed =
                demux::demux_chunk(engine, mode, length_size, &packet.data, packet.pts)?;
            trace!("数据块已送入引擎: {demuxed:?}, pts={}", packet.pts);
        }
        self.eos_pushed = packet.is_empty();

        self.allocator.set_frame_number(packet.frame_number);
        let host = Arc::clone(&self.host);
        let engine = self.engine_mut()?;
        driver::pump(engine, "解码失败")?;
        driver::drain_warnings(engine, host.as_ref());

        match engine.next_picture() {
            Some(picture) => self.deliver(picture, packet.frame_number).map(Some),
            None => Ok(None),
        }
    }

    fn flush(&mut self) -> HvResult<()> {
        self.engine_mut()?.reset();
        self.eos_pushed = false;
        if self.mode == StreamMode::Raw {
            self.replay_codec_data()?;
        }
        Ok(())
    }
}

impl Drop for HevcDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}
