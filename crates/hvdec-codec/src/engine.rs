//! 外部 HEVC 解码引擎契约.
//!
//! 引擎是黑盒组件: 接收 NAL 单元, 产出解码图像, 自带工作线程池,
//! 并允许安装自定义的输出缓冲区分配器. 引擎不同版本的 API 差异
//! (循环 `decode(&more)` 或单次 `get_action`) 由实现方在
//! [`DecodeEngine::decode_step`] 内部消化, 解码桥只面对一种契约.

use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use hvdec_core::{ChromaLayout, HvError};

/// 引擎错误或警告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFault {
    /// 引擎错误码
    pub code: i32,
    /// 引擎错误描述
    pub message: String,
}

impl EngineFault {
    /// 创建引擎错误
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 附加上下文, 转为统一错误类型
    pub fn into_error(self, context: &str) -> HvError {
        HvError::Engine {
            context: context.to_string(),
            code: self.code,
            message: self.message,
        }
    }
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code={})", self.message, self.code)
    }
}

/// 单步解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// 仍有待处理的工作, 应继续调用
    MoreWork,
    /// 需要更多输入数据
    WaitingForInput,
    /// 输出图像队列已满, 需要先取出图像
    BufferFull,
    /// 有图像可取
    PictureReady,
    /// 不可恢复的错误
    Failed(EngineFault),
}

/// 引擎为正在解码的图像申请缓冲区时给出的描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureSpec {
    /// 编码宽度 (像素)
    pub width: usize,
    /// 编码高度 (像素)
    pub height: usize,
    /// 可见宽度 (像素)
    pub visible_width: usize,
    /// 可见高度 (像素)
    pub visible_height: usize,
    /// 平面基址与跨距的对齐要求 (字节)
    pub alignment: usize,
    /// 色度布局
    pub chroma: ChromaLayout,
    /// 各平面位深
    pub bit_depths: [u32; 3],
}

impl PictureSpec {
    /// 按对齐要求向上取整后的宽度
    pub fn aligned_width(&self) -> usize {
        self.width.next_multiple_of(self.alignment.max(1))
    }

    /// 指定平面的位深
    pub fn bit_depth(&self, plane: usize) -> u32 {
        self.bit_depths[plane]
    }

    /// 所有有效平面共用的位深, 各平面位深不一致时返回 `None`
    pub fn uniform_bit_depth(&self) -> Option<u32> {
        let planes = self.chroma.plane_count();
        let first = self.bit_depths[0];
        self.bit_depths[..planes]
            .iter()
            .all(|&depth| depth == first)
            .then_some(first)
    }
}

/// 平面上的不透明用户数据
pub type PlaneTag = Arc<dyn Any + Send + Sync>;

/// 交给引擎的一个平面绑定
pub struct PlaneBinding {
    /// 平面基址
    pub data: NonNull<u8>,
    /// 跨距 (字节)
    pub stride: usize,
    /// 行数
    pub rows: usize,
    /// 不透明用户数据, 在释放回调中原样取回
    pub tag: Option<PlaneTag>,
}

// SAFETY: `data` 指向宿主缓冲区映射出的内存, 映射在对应的释放回调之前一直有效;
// 引擎保证同一图像槽的回调不会并发, 因此绑定可以随图像槽在线程间移动.
unsafe impl Send for PlaneBinding {}

impl fmt::Debug for PlaneBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaneBinding")
            .field("data", &self.data)
            .field("stride", &self.stride)
            .field("rows", &self.rows)
            .field("tagged", &self.tag.is_some())
            .finish()
    }
}

/// 引擎内部的图像槽, 分配器通过它写入平面绑定
pub trait PictureSlot {
    /// 绑定平面
    fn set_plane(&mut self, plane: usize, binding: PlaneBinding);

    /// 取回平面上的用户数据
    fn plane_tag(&self, plane: usize) -> Option<PlaneTag>;
}

/// 分配回调的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAllocation {
    /// 已绑定宿主缓冲区
    Bound,
    /// 交由引擎默认分配器处理
    Default,
}

/// 释放回调的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRelease {
    /// 已释放宿主缓冲区
    Released,
    /// 交由引擎默认释放流程处理
    Default,
}

/// 引擎输出缓冲区分配器
///
/// 回调可能来自任意引擎工作线程. 引擎保证同一图像槽上的回调串行.
pub trait PictureAllocator: Send + Sync {
    /// 为即将解码的图像提供平面内存
    fn get_buffer(&self, spec: &PictureSpec, slot: &mut dyn PictureSlot) -> BufferAllocation;

    /// 引擎不再使用该图像的平面内存
    fn release_buffer(&self, slot: &mut dyn PictureSlot) -> BufferRelease;
}

/// 引擎产出的已解码图像
pub trait DecodedPicture: Send {
    /// 色度布局
    fn chroma(&self) -> ChromaLayout;

    /// 平面宽度 (采样数)
    fn width(&self, plane: usize) -> usize;

    /// 平面高度 (行数)
    fn height(&self, plane: usize) -> usize;

    /// 平面位深
    fn bit_depth(&self, plane: usize) -> u32;

    /// 平面数据与跨距
    fn plane(&self, plane: usize) -> (&[u8], usize);

    /// 显示时间戳
    fn pts(&self) -> i64;

    /// 分配时绑定到平面上的用户数据
    fn plane_tag(&self, plane: usize) -> Option<PlaneTag>;
}

/// 解码引擎
pub trait DecodeEngine: Send {
    /// 引擎版本描述
    fn version(&self) -> String;

    /// 启动工作线程
    fn set_worker_threads(&mut self, threads: usize) -> Result<(), EngineFault>;

    /// 设置最大并行解码帧数 (不支持时忽略)
    fn set_max_parallel_frames(&mut self, _frames: usize) {}

    /// 安装输出缓冲区分配器
    fn set_allocator(&mut self, allocator: Arc<dyn PictureAllocator>);

    /// 送入一个完整 NAL 单元
    fn push_nal(&mut self, data: &[u8], pts: i64) -> Result<(), EngineFault>;

    /// 送入起始码码流数据, 由引擎自行切分 NAL
    fn push_data(&mut self, data: &[u8], pts: i64) -> Result<(), EngineFault>;

    /// 标记当前 NAL 数据结束
    fn push_end_of_nal(&mut self);

    /// 标记码流结束
    fn push_end_of_stream(&mut self) -> Result<(), EngineFault>;

    /// 执行一步解码
    fn decode_step(&mut self) -> DecodeStatus;

    /// 取出一个累积的警告
    fn next_warning(&mut self) -> Option<EngineFault>;

    /// 按输出顺序取出下一幅图像
    fn next_picture(&mut self) -> Option<Box<dyn DecodedPicture>>;

    /// 归还图像, 引擎随后可回收其缓冲区
    fn release_picture(&mut self, picture: Box<dyn DecodedPicture>) {
        drop(picture);
    }

    /// 重置解码状态, 丢弃在途图像
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(chroma: ChromaLayout, bit_depths: [u32; 3]) -> PictureSpec {
        PictureSpec {
            width: 100,
            height: 64,
            visible_width: 100,
            visible_height: 64,
            alignment: 16,
            chroma,
            bit_depths,
        }
    }

    #[test]
    fn test_对齐宽度() {
        assert_eq!(spec(ChromaLayout::Yuv420, [8; 3]).aligned_width(), 112);
        let mut s = spec(ChromaLayout::Yuv420, [8; 3]);
        s.alignment = 0;
        assert_eq!(s.aligned_width(), 100);
    }

    #[test]
    fn test_统一位深() {
        assert_eq!(
            spec(ChromaLayout::Yuv420, [10, 10, 10]).uniform_bit_depth(),
            Some(10)
        );
        assert_eq!(
            spec(ChromaLayout::Yuv420, [8, 10, 10]).uniform_bit_depth(),
            None
        );
        // 单色只看亮度平面
        assert_eq!(
            spec(ChromaLayout::Mono, [8, 0, 0]).uniform_bit_depth(),
            Some(8)
        );
    }

    #[test]
    fn test_引擎错误转换() {
        let err = EngineFault::new(3, "bad nal").into_error("推送数据失败");
        assert_eq!(err.to_string(), "推送数据失败: bad nal (code=3)");
        assert_eq!(EngineFault::new(9, "warn").to_string(), "warn (code=9)");
    }
}
