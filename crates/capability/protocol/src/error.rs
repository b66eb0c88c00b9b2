//! 链路错误类型定义

use std::io;
use std::time::Duration;

/// 链路传输错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// 请求或建链超过截止时间
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// 帧格式、CRC 或应答不匹配
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 设备返回 Modbus 异常码
    #[error("exception response: {0}")]
    Exception(String),

    /// 连接被拒绝、重置或串口不可用
    #[error("link down: {0}")]
    LinkDown(String),

    /// 数据区或请求不支持
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// 传输类型与端点不匹配
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// 可在同一寄存器上重试的错误。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Protocol(_))
    }

    pub fn is_link_down(&self) -> bool {
        matches!(self, Self::LinkDown(_))
    }

    /// 需要丢弃当前连接的错误。
    pub(crate) fn invalidates_link(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Protocol(_) | Self::LinkDown(_))
    }

    pub(crate) fn from_io(err: &io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout(timeout),
            io::ErrorKind::InvalidData => Self::Protocol(err.to_string()),
            _ => Self::LinkDown(err.to_string()),
        }
    }

    pub(crate) fn from_modbus(err: tokio_modbus::Error, timeout: Duration) -> Self {
        match err {
            tokio_modbus::Error::Transport(io_err) => Self::from_io(&io_err, timeout),
            tokio_modbus::Error::Protocol(protocol_err) => Self::Protocol(protocol_err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let timeout = Duration::from_millis(100);
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(TransportError::from_io(&refused, timeout).is_link_down());

        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(TransportError::from_io(&eof, timeout).is_link_down());

        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(
            TransportError::from_io(&timed_out, timeout),
            TransportError::Timeout(timeout)
        );

        let garbage = io::Error::new(io::ErrorKind::InvalidData, "bad crc");
        assert!(TransportError::from_io(&garbage, timeout).is_retryable());
    }

    #[test]
    fn exception_is_not_retryable() {
        let err = TransportError::Exception("IllegalDataAddress".to_string());
        assert!(!err.is_retryable());
        assert!(!err.invalidates_link());
    }
}
