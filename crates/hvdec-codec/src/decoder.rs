//! 解码器 trait 定义.
//!
//! 宿主管线通过 `Decoder` trait 驱动解码会话.

use hvdec_core::HvResult;

use crate::codec_parameters::CodecParameters;
use crate::frame::VideoFrame;
use crate::packet::Packet;

/// 解码器 trait
///
/// 宿主视角下的接口是同步、单线程的:
/// 1. 调用 `start()` 创建解码引擎
/// 2. 调用 `set_format()` 提供输入流参数 (可选的带外配置记录)
/// 3. 反复调用 `handle_packet()`: 送入一个数据块并尝试取出一帧
/// 4. 送入空包表示流结束, 随后继续调用以取出缓存帧
/// 5. seek 时调用 `flush()`, 结束时调用 `stop()`
pub trait Decoder: Send {
    /// 获取解码器名称
    fn name(&self) -> &str;

    /// 启动会话, 销毁已有引擎并创建新引擎
    fn start(&mut self) -> HvResult<()>;

    /// 停止会话, 释放引擎及其持有的全部输出缓冲区
    fn stop(&mut self);

    /// 使用宿主提供的输入流参数配置会话
    fn set_format(&mut self, params: &CodecParameters) -> HvResult<()>;

    /// 送入一个数据块并尝试取出一帧
    ///
    /// # 返回
    /// - `Ok(Some(frame))`: 取出一帧 (按引擎输出顺序)
    /// - `Ok(None)`: 暂无可输出的图像, 需要更多输入
    /// - `Err(_)`: 当前数据块处理失败, 会话仍可继续使用
    fn handle_packet(&mut self, packet: &Packet) -> HvResult<Option<VideoFrame>>;

    /// 刷新解码器, 丢弃在途图像
    fn flush(&mut self) -> HvResult<()>;
}
