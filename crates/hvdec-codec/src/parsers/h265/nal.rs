//! H.265/HEVC NAL (Network Abstraction Layer) 单元切分.
//!
//! 两种码流约定:
//! - 长度前缀 (packetized): `[N 字节大端长度][负载]` 重复, N ∈ {1,2,3,4}
//! - 起始码 (Annex B): `00 00 01` 或 `00 00 00 01` 分隔
//!
//! NAL 单元以借用切片返回, 生命周期限于调用方持有的数据块.

use hvdec_core::{HvError, HvResult};

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// TSA_N
    TsaN,
    /// TSA_R
    TsaR,
    /// STSA_N
    StsaN,
    /// STSA_R
    StsaR,
    /// RADL_N
    RadlN,
    /// RADL_R
    RadlR,
    /// RASL_N
    RaslN,
    /// RASL_R
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    /// VPS (Video Parameter Set)
    Vps,
    /// SPS (Sequence Parameter Set)
    Sps,
    /// PPS (Picture Parameter Set)
    Pps,
    /// AUD (Access Unit Delimiter)
    Aud,
    /// EOS (End of Sequence)
    Eos,
    /// EOB (End of Bitstream)
    Eob,
    /// FD (Filler Data)
    FillerData,
    /// PREFIX_SEI
    PrefixSei,
    /// SUFFIX_SEI
    SuffixSei,
    /// 保留或未定义类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            _ => Self::Unknown(id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::FillerData => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::Unknown(id) => *id,
        }
    }

    /// 简短名称, 用于日志与探测输出
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrailN => "TRAIL_N",
            Self::TrailR => "TRAIL_R",
            Self::TsaN => "TSA_N",
            Self::TsaR => "TSA_R",
            Self::StsaN => "STSA_N",
            Self::StsaR => "STSA_R",
            Self::RadlN => "RADL_N",
            Self::RadlR => "RADL_R",
            Self::RaslN => "RASL_N",
            Self::RaslR => "RASL_R",
            Self::BlaWLp => "BLA_W_LP",
            Self::BlaWRadl => "BLA_W_RADL",
            Self::BlaNLp => "BLA_N_LP",
            Self::IdrWRadl => "IDR_W_RADL",
            Self::IdrNLp => "IDR_N_LP",
            Self::Cra => "CRA",
            Self::Vps => "VPS",
            Self::Sps => "SPS",
            Self::Pps => "PPS",
            Self::Aud => "AUD",
            Self::Eos => "EOS",
            Self::Eob => "EOB",
            Self::FillerData => "FD",
            Self::PrefixSei => "PREFIX_SEI",
            Self::SuffixSei => "SUFFIX_SEI",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        self.type_id() < 32
    }

    /// 是否为 IRAP (Intra Random Access Point) NAL
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=21)
    }

    /// 是否为参数集 (VPS/SPS/PPS)
    pub fn is_parameter_set(&self) -> bool {
        matches!(self, Self::Vps | Self::Sps | Self::Pps)
    }
}

/// HEVC NAL 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// NAL 类型
    pub nal_type: HevcNalUnitType,
    /// nuh_layer_id
    pub layer_id: u8,
    /// nuh_temporal_id_plus1
    pub temporal_id_plus1: u8,
}

impl NalHeader {
    /// 从 NAL 数据的前 2 字节解析
    pub fn parse(data: &[u8]) -> HvResult<Self> {
        if data.len() < 2 {
            return Err(HvError::InvalidData("HEVC: NAL 数据太短".into()));
        }
        Ok(Self {
            nal_type: HevcNalUnitType::from_type_id((data[0] >> 1) & 0x3F),
            layer_id: ((data[0] & 1) << 5) | (data[1] >> 3),
            temporal_id_plus1: data[1] & 0x07,
        })
    }
}

/// 送入解码引擎的一个 NAL 单元
///
/// 数据为调用方存储的视图, 不拥有所有权.
#[derive(Debug, Clone, Copy)]
pub struct NalUnit<'a> {
    /// NAL 数据 (含 2 字节头, 不含长度前缀或起始码)
    pub data: &'a [u8],
    /// 显示时间戳
    pub pts: i64,
}

impl<'a> NalUnit<'a> {
    /// 创建 NAL 单元视图
    pub fn new(data: &'a [u8], pts: i64) -> Self {
        Self { data, pts }
    }

    /// 解析 NAL 头
    pub fn header(&self) -> HvResult<NalHeader> {
        NalHeader::parse(self.data)
    }
}

// ============================================================
// 长度前缀切分
// ============================================================

/// 按大端读取长度前缀 (1-4 字节)
pub fn read_length_prefix(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
}

fn check_length_size(length_size: usize) -> HvResult<()> {
    if (1..=4).contains(&length_size) {
        Ok(())
    } else {
        Err(HvError::InvalidArgument(format!(
            "NAL 长度前缀必须为 1-4 字节: {length_size}"
        )))
    }
}

/// 长度前缀码流的 NAL 迭代器
///
/// 长度前缀声明的字节数超过剩余数据时产生一次 `OverflowInInput` 并终止.
/// 数据块末尾不足一个长度前缀的字节被忽略.
pub struct LengthPrefixedNals<'a> {
    data: &'a [u8],
    pos: usize,
    length_size: usize,
    failed: bool,
}

impl<'a> LengthPrefixedNals<'a> {
    /// 创建迭代器
    pub fn new(data: &'a [u8], length_size: usize) -> HvResult<Self> {
        check_length_size(length_size)?;
        Ok(Self {
            data,
            pos: 0,
            length_size,
            failed: false,
        })
    }

    /// 尚未消费的字节数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl<'a> Iterator for LengthPrefixedNals<'a> {
    type Item = HvResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos + self.length_size > self.data.len() {
            return None;
        }
        let start = self.pos + self.length_size;
        let nal_size = read_length_prefix(&self.data[self.pos..start]);
        let available = self.data.len() - start;
        if nal_size > available {
            self.failed = true;
            return Some(Err(HvError::OverflowInInput {
                needed: nal_size,
                available,
            }));
        }
        self.pos = start + nal_size;
        Some(Ok(&self.data[start..self.pos]))
    }
}

/// 切分整个长度前缀数据块
///
/// 任何一个长度前缀越界都会使整块失败, 不返回部分结果.
pub fn split_length_prefixed(data: &[u8], length_size: usize) -> HvResult<Vec<&[u8]>> {
    LengthPrefixedNals::new(data, length_size)?.collect()
}

/// 以长度前缀形式追加一个 NAL 单元
pub fn append_length_prefixed(out: &mut Vec<u8>, nal: &[u8], length_size: usize) -> HvResult<()> {
    check_length_size(length_size)?;
    if (nal.len() as u64) >> (8 * length_size) != 0 {
        return Err(HvError::InvalidArgument(format!(
            "NAL 长度 {} 超出 {length_size} 字节前缀的表示范围",
            nal.len()
        )));
    }
    for i in (0..length_size).rev() {
        out.push((nal.len() >> (8 * i)) as u8);
    }
    out.extend_from_slice(nal);
    Ok(())
}

// ============================================================
// 起始码切分
// ============================================================

/// 数据是否以起始码样式开头 (`00 00 00` 或 `00 00 01`)
pub fn starts_with_start_code(data: &[u8]) -> bool {
    data.len() >= 3 && data[0] == 0 && data[1] == 0 && data[2] <= 1
}

/// 从 `from` 开始查找起始码, 返回 (位置, 起始码长度)
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
            if i + 3 < data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// 起始码码流的 NAL 迭代器
///
/// 第一个起始码之前的字节被跳过, NAL 末尾的 trailing_zero 字节被去除.
pub struct StartCodeNals<'a> {
    data: &'a [u8],
    next_start: Option<usize>,
}

impl<'a> StartCodeNals<'a> {
    /// 创建迭代器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next_start: find_start_code(data, 0).map(|(at, len)| at + len),
        }
    }
}

impl<'a> Iterator for StartCodeNals<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.next_start?;
            let end = match find_start_code(self.data, start) {
                Some((at, len)) => {
                    self.next_start = Some(at + len);
                    at
                }
                None => {
                    self.next_start = None;
                    self.data.len()
                }
            };
            let mut nal_end = end;
            while nal_end > start && self.data[nal_end - 1] == 0 {
                nal_end -= 1;
            }
            if nal_end > start {
                return Some(&self.data[start..nal_end]);
            }
        }
    }
}
