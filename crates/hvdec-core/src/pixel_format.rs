//! 输出像素格式与色度布局定义.
//!
//! 解码引擎按 (色度布局, 位深) 描述图像, 宿主管线只能表示有限的几种平面格式.
//! 本模块定义两者, 映射规则见 `hvdec-codec` 的格式解析器.

use std::fmt;

/// 色度子采样布局
///
/// 与 HEVC 的 `chroma_format_idc` 一一对应.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaLayout {
    /// 单色 (仅亮度平面)
    Mono,
    /// 4:2:0
    Yuv420,
    /// 4:2:2
    Yuv422,
    /// 4:4:4
    Yuv444,
}

impl ChromaLayout {
    /// 从 `chroma_format_idc` 创建
    pub fn from_idc(idc: u8) -> Option<Self> {
        match idc {
            0 => Some(Self::Mono),
            1 => Some(Self::Yuv420),
            2 => Some(Self::Yuv422),
            3 => Some(Self::Yuv444),
            _ => None,
        }
    }

    /// 平面数量
    pub const fn plane_count(&self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Yuv420 | Self::Yuv422 | Self::Yuv444 => 3,
        }
    }

    /// 色度子采样 (log2 水平, log2 垂直)
    pub const fn subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420 => (1, 1),
            Self::Yuv422 => (1, 0),
            Self::Mono | Self::Yuv444 => (0, 0),
        }
    }
}

impl fmt::Display for ChromaLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mono => "mono",
            Self::Yuv420 => "4:2:0",
            Self::Yuv422 => "4:2:2",
            Self::Yuv444 => "4:4:4",
        };
        write!(f, "{name}")
    }
}

/// 输出像素格式
///
/// 宿主管线可表示的固定格式集合: 各色度布局的 8 位与 10 位 (小端 16 位存储) 版本.
/// 命名规则: 颜色空间 + 位深 + 排列方式 (P=Planar, LE=小端).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 灰度 8 位
    Gray8,
    /// YUV 4:2:0 平面格式, 8 位
    Yuv420p,
    /// YUV 4:2:2 平面格式, 8 位
    Yuv422p,
    /// YUV 4:4:4 平面格式, 8 位
    Yuv444p,
    /// YUV 4:2:0 平面格式, 10 位小端
    Yuv420p10le,
    /// YUV 4:2:2 平面格式, 10 位小端
    Yuv422p10le,
    /// YUV 4:4:4 平面格式, 10 位小端
    Yuv444p10le,
}

impl PixelFormat {
    /// 单个分量的有效位深
    pub const fn bits_per_component(&self) -> u32 {
        match self {
            Self::Gray8 | Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 8,
            Self::Yuv420p10le | Self::Yuv422p10le | Self::Yuv444p10le => 10,
        }
    }

    /// 单个分量占用的存储字节数
    pub const fn bytes_per_component(&self) -> usize {
        (self.bits_per_component() as usize).div_ceil(8)
    }

    /// 对应的色度布局
    pub const fn chroma_layout(&self) -> ChromaLayout {
        match self {
            Self::Gray8 => ChromaLayout::Mono,
            Self::Yuv420p | Self::Yuv420p10le => ChromaLayout::Yuv420,
            Self::Yuv422p | Self::Yuv422p10le => ChromaLayout::Yuv422,
            Self::Yuv444p | Self::Yuv444p10le => ChromaLayout::Yuv444,
        }
    }

    /// 平面数量
    pub const fn plane_count(&self) -> usize {
        self.chroma_layout().plane_count()
    }

    /// 指定平面的宽度 (采样数), 奇数尺寸向上取整
    pub fn plane_width(&self, plane: usize, width: usize) -> Option<usize> {
        if plane >= self.plane_count() {
            return None;
        }
        if plane == 0 {
            return Some(width);
        }
        let (sub_h, _) = self.chroma_layout().subsampling();
        Some(width.div_ceil(1 << sub_h))
    }

    /// 指定平面的行数, 奇数尺寸向上取整
    pub fn plane_height(&self, plane: usize, height: usize) -> Option<usize> {
        if plane >= self.plane_count() {
            return None;
        }
        if plane == 0 {
            return Some(height);
        }
        let (_, sub_v) = self.chroma_layout().subsampling();
        Some(height.div_ceil(1 << sub_v))
    }

    /// 指定平面每行可见数据的字节数 (不含对齐填充)
    pub fn plane_linesize(&self, plane: usize, width: usize) -> Option<usize> {
        self.plane_width(plane, width)
            .map(|w| w * self.bytes_per_component())
    }

    /// 紧凑排列时整帧的字节数
    pub fn frame_size(&self, width: usize, height: usize) -> usize {
        (0..self.plane_count())
            .filter_map(|p| Some(self.plane_linesize(p, width)? * self.plane_height(p, height)?))
            .sum()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gray8 => "gray8",
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv420p10le => "yuv420p10le",
            Self::Yuv422p10le => "yuv422p10le",
            Self::Yuv444p10le => "yuv444p10le",
        };
        write!(f, "{name}")
    }
}
