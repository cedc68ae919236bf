//! 参数集注入: 在任何帧数据之前, 把带外配置记录中的参数集送入引擎.

use bytes::Bytes;
use hvdec_core::HvResult;
use log::debug;

use super::driver;
use super::settings::StreamMode;
use crate::codec_parameters::StreamFormatHint;
use crate::engine::DecodeEngine;
use crate::host::HostPipeline;
use crate::parsers::h265::{ConfigurationRecord, starts_with_start_code};
use crate::parsers::h265::config_record::RECORD_HEADER_LEN;

/// 参数集注入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// 判定的码流约定
    pub mode: StreamMode,
    /// 长度前缀字节数 (仅长度前缀约定时有意义)
    pub length_size: usize,
    /// 送入引擎的参数集 NAL 数量 (原始字节流时为 0)
    pub units: usize,
}

/// 根据前 3 字节判定码流约定
///
/// 只有 byte0 == 0 且 byte1 == 0 且 byte2 <= 1 (起始码样式) 才视为原始字节流.
/// 不超过 3 字节的数据无法构成配置记录, 也视为原始字节流.
pub fn detect_mode(data: &[u8]) -> StreamMode {
    if data.len() > 3 && !starts_with_start_code(data) {
        StreamMode::Packetized
    } else {
        StreamMode::Raw
    }
}

/// 注入带外配置数据
///
/// `length_size` 为会话当前的长度前缀字节数; 记录过短无法解析时沿用该值.
/// 引擎在此期间产出的图像全部丢弃.
pub fn ingest(
    engine: &mut dyn DecodeEngine,
    host: &dyn HostPipeline,
    data: &Bytes,
    hint: Option<StreamFormatHint>,
    length_size: usize,
) -> HvResult<IngestOutcome> {
    let mode = if hint == Some(StreamFormatHint::ByteStream) {
        StreamMode::Raw
    } else {
        detect_mode(data)
    };

    let mut outcome = IngestOutcome {
        mode,
        length_size,
        units: 0,
    };
    match mode {
        StreamMode::Packetized => {
            if data.len() >= RECORD_HEADER_LEN {
                let record = ConfigurationRecord::parse(data)?;
                if !record.has_supported_version() {
                    host.post_warning(&format!(
                        "不支持的配置记录版本 {}, 解码可能失败",
                        record.version
                    ));
                }
                for unit in record.units() {
                    engine
                        .push_nal(unit, 0)
                        .map_err(|f| f.into_error("推送参数集失败"))?;
                }
                outcome.length_size = record.length_size;
                outcome.units = record.unit_count();
            }
            debug!(
                "长度前缀码流, 前缀 {} 字节, 参数集 {} 个",
                outcome.length_size, outcome.units
            );
        }
        StreamMode::Raw => {
            debug!("原始字节流, 配置数据 {} 字节", data.len());
            engine
                .push_data(data, 0)
                .map_err(|f| f.into_error("推送配置数据失败"))?;
        }
    }

    engine.push_end_of_nal();
    driver::pump(engine, "解码配置数据失败")?;
    driver::drain_warnings(engine, host);
    let discarded = driver::discard_pictures(engine);
    if discarded > 0 {
        debug!("丢弃参数集阶段产出的 {discarded} 幅图像");
    }
    Ok(outcome)
}
