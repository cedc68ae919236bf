//! 统一错误类型定义.
//!
//! 所有 hvdec crate 共用的错误类型, 支持跨模块传播.
//! 致命错误只中止当前操作 (一个配置记录或一个数据块), 会话本身保持可用,
//! 是否停止由宿主决定.

use thiserror::Error;

/// hvdec 统一错误类型
#[derive(Debug, Error)]
pub enum HvError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的输出格式或操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 配置记录越界读取
    #[error("配置记录缓冲区下溢: {what} ({offset} > {size})")]
    BufferUnderrun {
        /// 正在读取的字段
        what: &'static str,
        /// 计算出的读取终点
        offset: usize,
        /// 缓冲区实际长度
        size: usize,
    },

    /// 长度前缀声明的字节数超过数据块剩余字节
    #[error("输入数据溢出, 请检查码流模式 (需要 {needed} 字节, 剩余 {available} 字节)")]
    OverflowInInput {
        /// 长度前缀声明的 NAL 字节数
        needed: usize,
        /// 数据块中剩余的字节数
        available: usize,
    },

    /// 解码引擎返回不可恢复的状态
    #[error("{context}: {message} (code={code})")]
    Engine {
        /// 出错时正在执行的操作
        context: String,
        /// 引擎错误码
        code: i32,
        /// 引擎错误描述
        message: String,
    },

    /// 宿主缓冲区映射失败
    #[error("缓冲区映射失败: {0}")]
    MapFailed(String),

    /// 宿主输出缓冲区分配失败
    #[error("输出缓冲区分配失败: {0}")]
    AllocationFailed(String),

    /// 输出格式协商失败
    #[error("输出格式协商失败: {0}")]
    Negotiation(String),

    /// 会话尚未启动
    #[error("解码会话未启动")]
    NotStarted,

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl HvError {
    /// 是否为码流解码类错误 (宿主通常以 STREAM/DECODE 语义上报)
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::BufferUnderrun { .. }
                | Self::OverflowInInput { .. }
                | Self::Engine { .. }
                | Self::InvalidData(_)
        )
    }
}

/// hvdec 统一 Result 类型
pub type HvResult<T> = Result<T, HvError>;
