//! RTU 串口参数。

use crate::error::TransportError;
use domain::{Parity, SerialSettings, StopBits};
use std::time::Duration;
use tokio_serial::{
    DataBits as SerialDataBits, Parity as SerialParity, SerialPortBuilderExt, SerialStream,
    StopBits as SerialStopBits,
};

/// 波特率高于该值时帧间隔固定为 1.75 ms。
const FIXED_GAP_BAUD: u32 = 19_200;
const FIXED_GAP: Duration = Duration::from_micros(1_750);

/// 帧间静默时间：3.5 个字符时间。
pub fn frame_gap(serial: &SerialSettings) -> Duration {
    if serial.baud_rate > FIXED_GAP_BAUD || serial.baud_rate == 0 {
        return FIXED_GAP;
    }
    let char_micros = u64::from(serial.bits_per_char()) * 1_000_000 / u64::from(serial.baud_rate);
    Duration::from_micros(char_micros * 7 / 2)
}

pub(crate) fn open(serial: &SerialSettings, timeout: Duration) -> Result<SerialStream, TransportError> {
    tokio_serial::new(&serial.device, serial.baud_rate)
        .data_bits(data_bits(serial.data_bits))
        .parity(parity(serial.parity))
        .stop_bits(stop_bits(serial.stop_bits))
        .timeout(timeout)
        .open_native_async()
        .map_err(|err| match err.kind {
            tokio_serial::ErrorKind::InvalidInput => {
                TransportError::InvalidConfig(format!("{}: {}", serial.device, err))
            }
            _ => TransportError::LinkDown(format!("{}: {}", serial.device, err)),
        })
}

fn data_bits(bits: u8) -> SerialDataBits {
    match bits {
        5 => SerialDataBits::Five,
        6 => SerialDataBits::Six,
        7 => SerialDataBits::Seven,
        _ => SerialDataBits::Eight,
    }
}

fn parity(parity: Parity) -> SerialParity {
    match parity {
        Parity::None => SerialParity::None,
        Parity::Odd => SerialParity::Odd,
        Parity::Even => SerialParity::Even,
    }
}

fn stop_bits(bits: StopBits) -> SerialStopBits {
    match bits {
        StopBits::One => SerialStopBits::One,
        StopBits::Two => SerialStopBits::Two,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(baud_rate: u32) -> SerialSettings {
        SerialSettings {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: 8,
        }
    }

    #[test]
    fn gap_is_three_and_a_half_chars() {
        // 9600 8N1：每字符 10 位 ≈ 1041 us
        assert_eq!(frame_gap(&settings(9600)), Duration::from_micros(3643));
    }

    #[test]
    fn gap_is_fixed_above_19200() {
        assert_eq!(frame_gap(&settings(115_200)), FIXED_GAP);
        assert_eq!(frame_gap(&settings(38_400)), FIXED_GAP);
    }
}
