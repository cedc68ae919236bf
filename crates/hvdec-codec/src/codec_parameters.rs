//! 宿主提供的输入流参数.
//!
//! 对应宿主管线在协商输入格式时给出的信息: 可选的带外配置记录、
//! 可选的码流格式提示以及输入帧率.

use bytes::Bytes;
use hvdec_core::Rational;

/// 宿主声明的码流格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormatHint {
    /// 带起始码的原始字节流 ("byte-stream")
    ByteStream,
    /// 长度前缀封装 ("hvc1"/"hev1")
    LengthPrefixed,
}

impl StreamFormatHint {
    /// 从宿主的格式字符串解析
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "byte-stream" => Some(Self::ByteStream),
            "hvc1" | "hev1" => Some(Self::LengthPrefixed),
            _ => None,
        }
    }
}

/// 输入流参数
#[derive(Debug, Clone, Default)]
pub struct CodecParameters {
    /// 带外配置记录 (hvcC 或原始参数集字节流)
    pub extra_data: Option<Bytes>,
    /// 码流格式提示
    pub stream_format: Option<StreamFormatHint>,
    /// 输入帧率, 未知时为 `None`
    pub frame_rate: Option<Rational>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_format_hint() {
        assert_eq!(
            StreamFormatHint::from_name("byte-stream"),
            Some(StreamFormatHint::ByteStream)
        );
        assert_eq!(
            StreamFormatHint::from_name("hvc1"),
            Some(StreamFormatHint::LengthPrefixed)
        );
        assert_eq!(StreamFormatHint::from_name("avc"), None);
    }
}
