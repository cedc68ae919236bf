//! 时间戳常量.
//!
//! 解码桥内部的时间戳统一为 `i64`, 单位由宿主决定, 桥只负责原样透传.

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 判断时间戳是否有效 (非 NOPTS_VALUE)
pub const fn is_valid_pts(pts: i64) -> bool {
    pts != NOPTS_VALUE
}
