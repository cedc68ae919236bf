//! NAL 解复用: 按会话的码流约定把每个数据块送入引擎.

use hvdec_core::HvResult;

use super::settings::StreamMode;
use crate::engine::DecodeEngine;
use crate::parsers::h265::{NalUnit, split_length_prefixed};

/// 一个数据块的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demuxed {
    /// 空数据块: 已向引擎发出码流结束
    EndOfStream,
    /// 长度前缀数据块: 送入的 NAL 数量
    Units(usize),
    /// 原始字节流数据块: 送入的字节数
    Stream(usize),
}

/// 把一个数据块送入引擎
///
/// 长度前缀数据块先完整切分再送入: 任何一个长度前缀越界都会以
/// `OverflowInInput` 失败, 此时引擎未收到该数据块的任何数据.
/// 数据块内的每个 NAL 都携带数据块的时间戳.
pub fn demux_chunk(
    engine: &mut dyn DecodeEngine,
    mode: StreamMode,
    length_size: usize,
    data: &[u8],
    pts: i64,
) -> HvResult<Demuxed> {
    if data.is_empty() {
        engine
            .push_end_of_stream()
            .map_err(|f| f.into_error("刷新数据失败"))?;
        return Ok(Demuxed::EndOfStream);
    }

    match mode {
        StreamMode::Packetized => {
            let units = split_length_prefixed(data, length_size)?;
            for unit in units.iter().map(|&data| NalUnit::new(data, pts)) {
                engine
                    .push_nal(unit.data, unit.pts)
                    .map_err(|f| f.into_error("推送数据失败"))?;
            }
            Ok(Demuxed::Units(units.len()))
        }
        StreamMode::Raw => {
            engine
                .push_data(data, pts)
                .map_err(|f| f.into_error("推送数据失败"))?;
            Ok(Demuxed::Stream(data.len()))
        }
    }
}
