//! 码流解析器.
//!
//! 目前只包含 HEVC: NAL 单元切分与带外配置记录解析.

pub mod h265;
