//! HEVCDecoderConfigurationRecord (带外配置记录) 解析.
//!
//! ```text
//! 字节 0        configurationVersion
//! 字节 1        profile_space(2) | tier(1) | profile_idc(5)
//! 字节 12       general_level_idc
//! 字节 16       reserved(6) | chromaFormat(2)
//! 字节 17/18    reserved(5) | bitDepthLuma/ChromaMinus8(3)
//! 字节 21       ... | lengthSizeMinusOne(2)
//! 字节 22       numOfArrays
//! 字节 23..     [头 1][数量 2][ [长度 2][NAL] ... ] ...
//! ```
//!
//! 整个记录在交给引擎之前完整解析, 任何越界读取都使解析失败且不产出任何 NAL.

use bytes::Bytes;
use hvdec_core::{ChromaLayout, HvError, HvResult};

use super::nal::HevcNalUnitType;

/// 固定头部长度, 参数集数组从此偏移开始
pub const RECORD_HEADER_LEN: usize = 23;

/// 无需告警的配置记录版本
pub const SUPPORTED_VERSION: u8 = 0;

/// 一个参数集数组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSetArray {
    /// 数组头字节: array_completeness(1) | reserved(1) | NAL_unit_type(6)
    pub header: u8,
    /// 数组内的 NAL 单元, 按记录中的顺序
    pub units: Vec<Bytes>,
}

impl ParameterSetArray {
    /// 数组声明的 NAL 类型
    pub fn nal_type(&self) -> HevcNalUnitType {
        HevcNalUnitType::from_type_id(self.header & 0x3F)
    }

    /// array_completeness 标志
    pub fn is_complete(&self) -> bool {
        self.header & 0x80 != 0
    }
}

/// 解析后的配置记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRecord {
    /// configurationVersion
    pub version: u8,
    /// general_profile_space
    pub general_profile_space: u8,
    /// general_tier_flag
    pub general_tier_flag: bool,
    /// general_profile_idc
    pub general_profile_idc: u8,
    /// general_level_idc
    pub general_level_idc: u8,
    /// chroma_format_idc
    pub chroma_format_idc: u8,
    /// 亮度位深
    pub bit_depth_luma: u8,
    /// 色度位深
    pub bit_depth_chroma: u8,
    /// NAL 长度前缀字节数 (1-4)
    pub length_size: usize,
    /// 参数集数组
    pub arrays: Vec<ParameterSetArray>,
}

fn ensure(what: &'static str, offset: usize, size: usize) -> HvResult<()> {
    if offset > size {
        Err(HvError::BufferUnderrun { what, offset, size })
    } else {
        Ok(())
    }
}

impl ConfigurationRecord {
    /// 解析配置记录
    ///
    /// 返回的 NAL 单元与 `data` 共享底层存储.
    pub fn parse(data: &Bytes) -> HvResult<Self> {
        let size = data.len();
        ensure("配置记录头", RECORD_HEADER_LEN, size)?;

        let num_arrays = usize::from(data[22]);
        let mut arrays = Vec::with_capacity(num_arrays);
        let mut pos = RECORD_HEADER_LEN;
        for _ in 0..num_arrays {
            ensure("参数集数组头", pos + 3, size)?;
            let header = data[pos];
            let nal_count = usize::from(u16::from_be_bytes([data[pos + 1], data[pos + 2]]));
            pos += 3;

            let mut units = Vec::with_capacity(nal_count);
            for _ in 0..nal_count {
                ensure("参数集 NAL 长度", pos + 2, size)?;
                let nal_size = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
                ensure("参数集 NAL", pos + 2 + nal_size, size)?;
                units.push(data.slice(pos + 2..pos + 2 + nal_size));
                pos += 2 + nal_size;
            }
            arrays.push(ParameterSetArray { header, units });
        }

        Ok(Self {
            version: data[0],
            general_profile_space: data[1] >> 6,
            general_tier_flag: data[1] & 0x20 != 0,
            general_profile_idc: data[1] & 0x1F,
            general_level_idc: data[12],
            chroma_format_idc: data[16] & 0x03,
            bit_depth_luma: (data[17] & 0x07) + 8,
            bit_depth_chroma: (data[18] & 0x07) + 8,
            length_size: usize::from(data[21] & 0x03) + 1,
            arrays,
        })
    }

    /// 版本是否无需告警
    pub fn has_supported_version(&self) -> bool {
        self.version == SUPPORTED_VERSION
    }

    /// 按数组、再按单元的顺序遍历全部参数集 NAL
    pub fn units(&self) -> impl Iterator<Item = &Bytes> {
        self.arrays.iter().flat_map(|array| array.units.iter())
    }

    /// 参数集 NAL 总数
    pub fn unit_count(&self) -> usize {
        self.arrays.iter().map(|array| array.units.len()).sum()
    }

    /// 记录声明的色度布局
    pub fn chroma_layout(&self) -> Option<ChromaLayout> {
        ChromaLayout::from_idc(self.chroma_format_idc)
    }

    /// 序列化为配置记录字节
    ///
    /// 未保存的兼容性/约束标志写为 0.
    pub fn build(&self) -> HvResult<Vec<u8>> {
        if !(1..=4).contains(&self.length_size) {
            return Err(HvError::InvalidArgument(format!(
                "NAL 长度前缀必须为 1-4 字节: {}",
                self.length_size
            )));
        }
        let num_arrays = u8::try_from(self.arrays.len())
            .map_err(|_| HvError::InvalidArgument("参数集数组过多".into()))?;

        let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + self.unit_count() * 32);
        buf.push(self.version);
        buf.push(
            (self.general_profile_space << 6)
                | (u8::from(self.general_tier_flag) << 5)
                | (self.general_profile_idc & 0x1F),
        );
        // general_profile_compatibility_flags + general_constraint_indicator_flags
        buf.extend_from_slice(&[0; 10]);
        buf.push(self.general_level_idc);
        buf.extend_from_slice(&[0xF0, 0x00]);
        buf.push(0xFC);
        buf.push(0xFC | (self.chroma_format_idc & 0x03));
        buf.push(0xF8 | (self.bit_depth_luma.saturating_sub(8) & 0x07));
        buf.push(0xF8 | (self.bit_depth_chroma.saturating_sub(8) & 0x07));
        buf.extend_from_slice(&[0, 0]);
        buf.push((self.length_size - 1) as u8);
        buf.push(num_arrays);

        for array in &self.arrays {
            let count = u16::try_from(array.units.len())
                .map_err(|_| HvError::InvalidArgument("参数集数组内 NAL 过多".into()))?;
            buf.push(array.header);
            buf.extend_from_slice(&count.to_be_bytes());
            for unit in &array.units {
                let len = u16::try_from(unit.len())
                    .map_err(|_| HvError::InvalidArgument("参数集 NAL 过长".into()))?;
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(unit);
            }
        }
        Ok(buf)
    }
}
