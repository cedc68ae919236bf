//! 单平面拷贝与位深转换.
//!
//! 源平面来自解码引擎 (采样位深 ≤ 8 时每采样 1 字节, 否则 2 字节小端),
//! 目标平面位于宿主输出缓冲区, 存储位深由输出格式决定.
//!
//! 四种数值情形 (按源位深与目标最大位深比较):
//! ```text
//! 源 == 目标            逐字节复制
//! 源 >  目标, 目标 > 8  u16 >> (源 - 目标) → u16
//! 源 >  目标, 目标 == 8 u16 >> (源 - 目标) → u8
//! 源 <  目标, 目标 > 8  u8/u16 << (目标 - 源) → u16
//! ```
//! 所有移位逐采样进行, 保持行数与可见宽度; 不读取源跨距之外的字节,
//! 也不写入目标跨距之外的字节.

use byteorder::{ByteOrder, LittleEndian};
use hvdec_core::{HvError, HvResult};
use log::trace;
use rayon::prelude::*;

/// 平面字节数超过此值时按行并行处理
const PARALLEL_THRESHOLD: usize = 256 * 1024;

/// 源平面 (只读)
pub struct PlaneInput<'a> {
    /// 平面数据, 至少覆盖 `stride * (height - 1) + 行宽`
    pub data: &'a [u8],
    /// 每行字节数 (跨距)
    pub stride: usize,
    /// 可见宽度 (采样数)
    pub width: usize,
    /// 行数
    pub height: usize,
    /// 采样位深
    pub bit_depth: u32,
}

/// 目标平面 (可写)
pub struct PlaneOutput<'a> {
    /// 平面数据
    pub data: &'a mut [u8],
    /// 每行字节数 (跨距)
    pub stride: usize,
    /// 输出格式的最大位深
    pub bit_depth: u32,
}

/// 位深转换方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthConversion {
    /// 位深相同, 直接复制
    Copy,
    /// 16 位采样右移后写 16 位
    ShiftDown {
        /// 右移位数
        shift: u32,
    },
    /// 16 位采样右移后收窄为 8 位
    Narrow {
        /// 右移位数
        shift: u32,
    },
    /// 8 位采样左移扩展为 16 位
    Widen {
        /// 左移位数
        shift: u32,
    },
    /// 16 位采样左移后写 16 位
    ShiftUp {
        /// 左移位数
        shift: u32,
    },
}

impl DepthConversion {
    /// 根据源位深与目标最大位深选择转换方式
    pub fn select(src_bits: u32, dst_bits: u32) -> HvResult<Self> {
        if src_bits == 0 || src_bits > 16 || dst_bits == 0 || dst_bits > 16 {
            return Err(HvError::Unsupported(format!(
                "不支持的位深转换: {src_bits} → {dst_bits}"
            )));
        }
        Ok(if src_bits == dst_bits {
            Self::Copy
        } else if src_bits > dst_bits {
            let shift = src_bits - dst_bits;
            if dst_bits > 8 {
                Self::ShiftDown { shift }
            } else {
                Self::Narrow { shift }
            }
        } else {
            if dst_bits <= 8 {
                return Err(HvError::Unsupported(format!(
                    "不支持的位深转换: {src_bits} → {dst_bits}"
                )));
            }
            let shift = dst_bits - src_bits;
            if src_bits <= 8 {
                Self::Widen { shift }
            } else {
                Self::ShiftUp { shift }
            }
        })
    }

    /// 处理一行可见采样
    fn apply(self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::Copy => dst.copy_from_slice(src),
            Self::ShiftDown { shift } => {
                for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
                    LittleEndian::write_u16(d, LittleEndian::read_u16(s) >> shift);
                }
            }
            Self::Narrow { shift } => {
                for (s, d) in src.chunks_exact(2).zip(dst.iter_mut()) {
                    *d = (LittleEndian::read_u16(s) >> shift) as u8;
                }
            }
            Self::Widen { shift } => {
                for (s, d) in src.iter().zip(dst.chunks_exact_mut(2)) {
                    LittleEndian::write_u16(d, u16::from(*s) << shift);
                }
            }
            Self::ShiftUp { shift } => {
                for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
                    LittleEndian::write_u16(d, LittleEndian::read_u16(s) << shift);
                }
            }
        }
    }
}

/// 指定位深的每采样存储字节数
pub fn bytes_per_sample(bit_depth: u32) -> usize {
    if bit_depth > 8 { 2 } else { 1 }
}

/// 覆盖 `rows` 行所需的最小缓冲区长度
fn required_len(stride: usize, row_bytes: usize, rows: usize) -> usize {
    if rows == 0 {
        0
    } else {
        stride * (rows - 1) + row_bytes
    }
}

/// 拷贝并转换一个平面
///
/// # 返回
/// - `Ok(conversion)`: 实际采用的转换方式
/// - `Err(HvError::InvalidArgument)`: 跨距或缓冲区长度不足以容纳可见区域
/// - `Err(HvError::Unsupported)`: 位深组合无法表示
pub fn convert_plane(src: &PlaneInput, dst: &mut PlaneOutput) -> HvResult<DepthConversion> {
    let conversion = DepthConversion::select(src.bit_depth, dst.bit_depth)?;
    let src_row = src.width * bytes_per_sample(src.bit_depth);
    let dst_row = src.width * bytes_per_sample(dst.bit_depth);

    if src.stride < src_row || dst.stride < dst_row {
        return Err(HvError::InvalidArgument(format!(
            "平面跨距不足: 源 {}/{}, 目标 {}/{}",
            src.stride, src_row, dst.stride, dst_row
        )));
    }
    let src_needed = required_len(src.stride, src_row, src.height);
    let dst_needed = required_len(dst.stride, dst_row, src.height);
    if src.data.len() < src_needed || dst.data.len() < dst_needed {
        return Err(HvError::InvalidArgument(format!(
            "平面缓冲区过小: 源 {}/{}, 目标 {}/{}",
            src.data.len(),
            src_needed,
            dst.data.len(),
            dst_needed
        )));
    }
    if src.height == 0 || src_row == 0 {
        return Ok(conversion);
    }

    trace!(
        "平面转换: {}x{} {}bit → {}bit, {:?}",
        src.width, src.height, src.bit_depth, dst.bit_depth, conversion
    );

    // 跨距均等于行宽时整块复制
    if conversion == DepthConversion::Copy && src.stride == src_row && dst.stride == dst_row {
        let total = src_row * src.height;
        dst.data[..total].copy_from_slice(&src.data[..total]);
        return Ok(conversion);
    }

    let src_plane = &src.data[..src_needed];
    let dst_plane = &mut dst.data[..dst_needed];
    if src_needed >= PARALLEL_THRESHOLD {
        src_plane
            .par_chunks(src.stride)
            .zip(dst_plane.par_chunks_mut(dst.stride))
            .for_each(|(s, d)| conversion.apply(&s[..src_row], &mut d[..dst_row]));
    } else {
        for (s, d) in src_plane
            .chunks(src.stride)
            .zip(dst_plane.chunks_mut(dst.stride))
        {
            conversion.apply(&s[..src_row], &mut d[..dst_row]);
        }
    }
    Ok(conversion)
}
