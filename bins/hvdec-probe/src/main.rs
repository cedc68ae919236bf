//! hvdec-probe - HEVC 码流探测工具
//!
//! 解析带外配置记录 (HEVCDecoderConfigurationRecord) 与 HEVC 基本流文件,
//! 按解码桥相同的规则判定码流约定, 统计并列出 NAL 单元.

use std::collections::BTreeMap;
use std::fs;
use std::process;

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use log::debug;
use serde::Serialize;

use hvdec_codec::decoders::hevc::{DEFAULT_LENGTH_SIZE, StreamMode, detect_mode};
use hvdec_codec::parsers::h265::config_record::RECORD_HEADER_LEN;
use hvdec_codec::parsers::h265::{
    ConfigurationRecord, LengthPrefixedNals, NalHeader, StartCodeNals, starts_with_start_code,
};

/// 码流约定选择
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    /// 按前 3 字节自动判定
    Auto,
    /// 长度前缀封装
    Packetized,
    /// 起始码字节流
    Raw,
}

/// HEVC 码流探测工具
#[derive(Parser, Debug)]
#[command(name = "hvdec-probe", version, about = "HEVC 配置记录与基本流探测工具")]
struct Cli {
    /// 输入文件路径
    input: Option<String>,

    /// 带外配置记录文件, 用于确定长度前缀字节数
    #[arg(long)]
    config: Option<String>,

    /// 把输入文件本身作为配置记录解析
    #[arg(long)]
    record: bool,

    /// 码流约定
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    mode: ModeArg,

    /// 长度前缀字节数 (1-4), 优先于配置记录
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    length_size: Option<u8>,

    /// 列出每个 NAL 单元
    #[arg(long)]
    show_nals: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// 输出结构体
// ============================================================

#[derive(Serialize)]
struct ProbeOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<RecordInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<StreamSummary>,
}

/// 配置记录摘要
#[derive(Serialize, Debug)]
struct RecordInfo {
    version: u8,
    supported_version: bool,
    profile_space: u8,
    tier: &'static str,
    profile_idc: u8,
    level_idc: u8,
    chroma_format: String,
    bit_depth_luma: u8,
    bit_depth_chroma: u8,
    length_size: usize,
    arrays: Vec<ArrayInfo>,
}

#[derive(Serialize, Debug)]
struct ArrayInfo {
    nal_type: &'static str,
    complete: bool,
    count: usize,
    bytes: usize,
}

/// 基本流统计
#[derive(Serialize, Debug)]
struct StreamSummary {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    length_size: Option<usize>,
    total_nals: usize,
    total_bytes: usize,
    by_type: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nals: Option<Vec<NalInfo>>,
}

#[derive(Serialize, Debug)]
struct NalInfo {
    index: usize,
    offset: usize,
    size: usize,
    nal_type: &'static str,
    type_id: u8,
    layer_id: u8,
    temporal_id: u8,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let Some(input_path) = cli.input.as_deref() else {
        print_banner();
        return;
    };

    if !cli.quiet {
        eprintln!("hvdec-probe 版本 {}", env!("CARGO_PKG_VERSION"));
        eprintln!("输入文件: {input_path}");
    }
    let data = read_file(input_path);

    let output = if cli.record {
        ProbeOutput {
            record: Some(parse_record_or_exit(data, input_path)),
            stream: None,
        }
    } else {
        let record = cli.config.as_deref().and_then(|path| {
            let config = read_file(path);
            if starts_with_start_code(&config) {
                debug!("配置数据为起始码字节流, 不含长度前缀信息");
                None
            } else {
                Some(parse_record_or_exit(config, path))
            }
        });
        let mode = match cli.mode {
            ModeArg::Auto => detect_mode(&data),
            ModeArg::Packetized => StreamMode::Packetized,
            ModeArg::Raw => StreamMode::Raw,
        };
        let length_size = cli
            .length_size
            .map(usize::from)
            .or(record.as_ref().map(|r| r.length_size))
            .unwrap_or(DEFAULT_LENGTH_SIZE);
        if !cli.quiet {
            eprintln!("码流约定: {}", mode.name());
        }
        ProbeOutput {
            stream: Some(scan_stream(&data, mode, length_size, cli.show_nals)),
            record,
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("错误: JSON 序列化失败: {e}");
                process::exit(1);
            }
        }
    } else {
        if let Some(ref record) = output.record {
            print_record_text(record);
        }
        if let Some(ref stream) = output.stream {
            print_stream_text(stream);
        }
    }
}

fn read_file(path: &str) -> Vec<u8> {
    match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("错误: 无法读取文件 '{path}': {e}");
            process::exit(1);
        }
    }
}

fn parse_record_or_exit(data: Vec<u8>, path: &str) -> RecordInfo {
    if data.len() < RECORD_HEADER_LEN {
        eprintln!(
            "错误: '{path}' 只有 {} 字节, 不足配置记录头 {RECORD_HEADER_LEN} 字节",
            data.len()
        );
        process::exit(1);
    }
    match ConfigurationRecord::parse(&Bytes::from(data)) {
        Ok(record) => describe_record(&record),
        Err(e) => {
            eprintln!("错误: 无法解析配置记录 '{path}': {e}");
            process::exit(1);
        }
    }
}

/// 从配置记录构建摘要
fn describe_record(record: &ConfigurationRecord) -> RecordInfo {
    RecordInfo {
        version: record.version,
        supported_version: record.has_supported_version(),
        profile_space: record.general_profile_space,
        tier: if record.general_tier_flag {
            "high"
        } else {
            "main"
        },
        profile_idc: record.general_profile_idc,
        level_idc: record.general_level_idc,
        chroma_format: record
            .chroma_layout()
            .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
        bit_depth_luma: record.bit_depth_luma,
        bit_depth_chroma: record.bit_depth_chroma,
        length_size: record.length_size,
        arrays: record
            .arrays
            .iter()
            .map(|array| ArrayInfo {
                nal_type: array.nal_type().name(),
                complete: array.is_complete(),
                count: array.units.len(),
                bytes: array.units.iter().map(|u| u.len()).sum(),
            })
            .collect(),
    }
}

/// 扫描基本流, 统计 NAL 单元
///
/// 长度前缀越界时停止扫描并记录错误, 已扫描的统计保留.
fn scan_stream(data: &[u8], mode: StreamMode, length_size: usize, keep_nals: bool) -> StreamSummary {
    let mut summary = StreamSummary {
        mode: mode.name(),
        length_size: (mode == StreamMode::Packetized).then_some(length_size),
        total_nals: 0,
        total_bytes: data.len(),
        by_type: BTreeMap::new(),
        error: None,
        nals: keep_nals.then(Vec::new),
    };

    let mut record_nal = |nal: &[u8]| {
        let index = summary.total_nals;
        summary.total_nals += 1;
        let header = match NalHeader::parse(nal) {
            Ok(header) => header,
            Err(e) => {
                debug!("NAL #{index}: {e}");
                *summary.by_type.entry("INVALID").or_default() += 1;
                return;
            }
        };
        *summary.by_type.entry(header.nal_type.name()).or_default() += 1;
        if let Some(nals) = summary.nals.as_mut() {
            nals.push(NalInfo {
                index,
                offset: nal.as_ptr() as usize - data.as_ptr() as usize,
                size: nal.len(),
                nal_type: header.nal_type.name(),
                type_id: header.nal_type.type_id(),
                layer_id: header.layer_id,
                temporal_id: header.temporal_id_plus1.saturating_sub(1),
            });
        }
    };

    match mode {
        StreamMode::Raw => StartCodeNals::new(data).for_each(&mut record_nal),
        StreamMode::Packetized => match LengthPrefixedNals::new(data, length_size) {
            Ok(nals) => {
                for nal in nals {
                    match nal {
                        Ok(nal) => record_nal(nal),
                        Err(e) => {
                            summary.error = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => summary.error = Some(e.to_string()),
        },
    }
    summary
}

// ============================================================
// 文本输出
// ============================================================

fn print_record_text(info: &RecordInfo) {
    println!("[RECORD]");
    println!("  版本         : {}", info.version);
    if !info.supported_version {
        println!("  警告         : 不支持的配置记录版本, 解码可能失败");
    }
    println!(
        "  档次/级别    : profile={} tier={} level={}",
        info.profile_idc, info.tier, info.level_idc
    );
    println!("  色度格式     : {}", info.chroma_format);
    println!(
        "  位深         : 亮度 {} / 色度 {}",
        info.bit_depth_luma, info.bit_depth_chroma
    );
    println!("  长度前缀     : {} 字节", info.length_size);
    for array in &info.arrays {
        println!(
            "  参数集数组   : {} x{} ({} 字节){}",
            array.nal_type,
            array.count,
            array.bytes,
            if array.complete { " [complete]" } else { "" }
        );
    }
    println!("[/RECORD]");
    println!();
}

fn print_stream_text(summary: &StreamSummary) {
    println!("[STREAM]");
    println!("  码流约定     : {}", summary.mode);
    if let Some(size) = summary.length_size {
        println!("  长度前缀     : {size} 字节");
    }
    println!("  数据总量     : {} 字节", summary.total_bytes);
    println!("  NAL 总数     : {}", summary.total_nals);
    for (name, count) in &summary.by_type {
        println!("    {name:<14}: {count}");
    }
    if let Some(ref err) = summary.error {
        println!("  错误         : {err}");
    }
    println!("[/STREAM]");
    println!();

    if let Some(ref nals) = summary.nals {
        println!("[NALS]");
        for nal in nals {
            println!(
                "  #{:<5} @{:<8} {:>7} 字节  {:<14} (type={}, layer={}, tid={})",
                nal.index,
                nal.offset,
                nal.size,
                nal.nal_type,
                nal.type_id,
                nal.layer_id,
                nal.temporal_id
            );
        }
        println!("[/NALS]");
        println!();
    }
}

/// 打印版本横幅
fn print_banner() {
    println!("hvdec-probe 版本 {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: hvdec-probe [选项] <输入文件>");
    println!();
    println!("选项:");
    println!("  --config <文件>       带外配置记录 (决定长度前缀字节数)");
    println!("  --record              把输入文件作为配置记录解析");
    println!("  --mode <auto|packetized|raw>");
    println!("  --length-size <1-4>   长度前缀字节数");
    println!("  --show-nals           列出每个 NAL 单元");
    println!("  --json                以 JSON 格式输出");
    println!("  -q, --quiet           静默模式");
    println!();
    println!("使用 --help 查看完整用法.");
}
