/// 解码错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("{data_type} expects {expected} words, got {actual}")]
    WordCount {
        data_type: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("decoded value is not finite")]
    NonFinite,
}

/// 编码错误（写入路径）。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("value is not finite")]
    NonFinite,
    #[error("register scale is zero")]
    ZeroScale,
    #[error("value {value} out of range for {data_type}")]
    OutOfRange { value: f64, data_type: &'static str },
}
