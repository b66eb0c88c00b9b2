//! # 寄存器编解码
//!
//! 原始寄存器字与工程值之间的纯函数转换：
//!
//! ```text
//! raw words ──(字节序/字序)──▶ 按 data_type 解释 ──▶ × scale + offset ──▶ 按 precision 四舍五入
//! ```
//!
//! - 多字类型默认高位字在前（Modbus 惯例），字节序与字序均可按端口 / 寄存器配置
//! - 位类型（bool）不做缩放，解码为 0 / 1
//! - 写入方向 [`encode`] 为逆运算，整数类型取最近整数并做范围检查

mod error;

pub use error::{DecodeError, EncodeError};

use domain::{ByteOrder, DataType, RegisterConfig, WordOrder};

/// 缩放参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub scale: f64,
    pub offset: f64,
    /// 小数位数
    pub precision: u8,
}

impl Scaling {
    pub fn new(scale: f64, offset: f64, precision: u8) -> Self {
        Self {
            scale,
            offset,
            precision,
        }
    }

    /// 不缩放、不偏移。
    pub fn identity(precision: u8) -> Self {
        Self::new(1.0, 0.0, precision)
    }
}

impl From<&RegisterConfig> for Scaling {
    fn from(register: &RegisterConfig) -> Self {
        Self::new(register.scale, register.offset, register.precision)
    }
}

/// 多字类型的字节 / 字排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WordLayout {
    pub byte_order: ByteOrder,
    pub word_order: WordOrder,
}

impl WordLayout {
    pub fn new(byte_order: ByteOrder, word_order: WordOrder) -> Self {
        Self {
            byte_order,
            word_order,
        }
    }
}

/// 解码原始寄存器字。
pub fn decode(
    raw: &[u16],
    data_type: DataType,
    scaling: Scaling,
    layout: WordLayout,
) -> Result<f64, DecodeError> {
    let expected = data_type.word_count();
    if raw.len() != expected {
        return Err(DecodeError::WordCount {
            data_type: data_type.as_str(),
            expected,
            actual: raw.len(),
        });
    }

    if data_type == DataType::Bool {
        return Ok(if raw[0] != 0 { 1.0 } else { 0.0 });
    }

    let words = to_big_endian(raw, layout);
    let value = match data_type {
        DataType::Uint16 => f64::from(words[0]),
        DataType::Int16 => f64::from(words[0] as i16),
        DataType::Uint32 => f64::from(join_u32(&words)),
        DataType::Int32 => f64::from(join_u32(&words) as i32),
        DataType::Float32 => f64::from(f32::from_bits(join_u32(&words))),
        DataType::Float64 => f64::from_bits(join_u64(&words)),
        DataType::Bool => unreachable!("bool handled above"),
    };
    if !value.is_finite() {
        return Err(DecodeError::NonFinite);
    }

    Ok(round_to(
        value * scaling.scale + scaling.offset,
        scaling.precision,
    ))
}

/// 编码工程值为待写入的寄存器字（不含 precision，写入时不需要）。
pub fn encode(
    value: f64,
    data_type: DataType,
    scaling: Scaling,
    layout: WordLayout,
) -> Result<Vec<u16>, EncodeError> {
    if !value.is_finite() {
        return Err(EncodeError::NonFinite);
    }
    if data_type == DataType::Bool {
        return Ok(vec![u16::from(value != 0.0)]);
    }
    if scaling.scale == 0.0 {
        return Err(EncodeError::ZeroScale);
    }

    let raw = (value - scaling.offset) / scaling.scale;
    let out_of_range = || EncodeError::OutOfRange {
        value,
        data_type: data_type.as_str(),
    };

    let words = match data_type {
        DataType::Uint16 => {
            let rounded = raw.round();
            if !(0.0..=f64::from(u16::MAX)).contains(&rounded) {
                return Err(out_of_range());
            }
            vec![rounded as u16]
        }
        DataType::Int16 => {
            let rounded = raw.round();
            if !(f64::from(i16::MIN)..=f64::from(i16::MAX)).contains(&rounded) {
                return Err(out_of_range());
            }
            vec![rounded as i16 as u16]
        }
        DataType::Uint32 => {
            let rounded = raw.round();
            if !(0.0..=f64::from(u32::MAX)).contains(&rounded) {
                return Err(out_of_range());
            }
            split_u32(rounded as u32).to_vec()
        }
        DataType::Int32 => {
            let rounded = raw.round();
            if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&rounded) {
                return Err(out_of_range());
            }
            split_u32(rounded as i32 as u32).to_vec()
        }
        DataType::Float32 => {
            let narrowed = raw as f32;
            if !narrowed.is_finite() {
                return Err(out_of_range());
            }
            split_u32(narrowed.to_bits()).to_vec()
        }
        DataType::Float64 => split_u64(raw.to_bits()).to_vec(),
        DataType::Bool => unreachable!("bool handled above"),
    };

    Ok(from_big_endian(words, layout))
}

/// 按寄存器配置解码。
pub fn decode_register(
    register: &RegisterConfig,
    layout: WordLayout,
    raw: &[u16],
) -> Result<f64, DecodeError> {
    decode(raw, register.data_type, Scaling::from(register), layout)
}

/// 按寄存器配置编码。
pub fn encode_register(
    register: &RegisterConfig,
    layout: WordLayout,
    value: f64,
) -> Result<Vec<u16>, EncodeError> {
    encode(value, register.data_type, Scaling::from(register), layout)
}

/// 四舍五入（远离零）到指定小数位。
pub fn round_to(value: f64, precision: u8) -> f64 {
    let factor = 10f64.powi(i32::from(precision));
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

// 设备排列 → 高位字在前、字内高字节在前
fn to_big_endian(raw: &[u16], layout: WordLayout) -> Vec<u16> {
    let mut words: Vec<u16> = raw
        .iter()
        .map(|word| match layout.byte_order {
            ByteOrder::Big => *word,
            ByteOrder::Little => word.swap_bytes(),
        })
        .collect();
    if layout.word_order == WordOrder::Little {
        words.reverse();
    }
    words
}

// 两种变换都是自逆的，逆向复用同一实现
fn from_big_endian(words: Vec<u16>, layout: WordLayout) -> Vec<u16> {
    to_big_endian(&words, layout)
}

fn join_u32(words: &[u16]) -> u32 {
    (u32::from(words[0]) << 16) | u32::from(words[1])
}

fn join_u64(words: &[u16]) -> u64 {
    words
        .iter()
        .fold(0u64, |acc, word| (acc << 16) | u64::from(*word))
}

fn split_u32(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

fn split_u64(value: u64) -> [u16; 4] {
    [
        (value >> 48) as u16,
        (value >> 32) as u16,
        (value >> 16) as u16,
        value as u16,
    ]
}
