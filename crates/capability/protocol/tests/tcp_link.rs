use domain::{ByteOrder, LinkEndpoint, PortConfig, RegisterRegion, TransportKind, WordOrder};
use mbus_protocol::{LinkTransport, ModbusLink, TransportError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const DEADLINE: Duration = Duration::from_millis(300);

fn tcp_port(addr: SocketAddr) -> PortConfig {
    PortConfig {
        name: "test".to_string(),
        description: String::new(),
        transport: TransportKind::Tcp,
        endpoint: LinkEndpoint::Network {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
        timeout: DEADLINE,
        connect_timeout: DEADLINE,
        max_retries: 0,
        retry_delay: Duration::ZERO,
        enabled: true,
        byte_order: ByteOrder::Big,
        word_order: WordOrder::Big,
        coalesce_reads: false,
        devices: Vec::new(),
    }
}

/// 读一个 MBAP 请求，返回（事务号，单元号，PDU）。
async fn read_request(stream: &mut TcpStream) -> Option<(u16, u8, Vec<u8>)> {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.ok()?;
    let transaction = u16::from_be_bytes([header[0], header[1]]);
    let len = u16::from_be_bytes([header[4], header[5]]) as usize;
    let mut pdu = vec![0u8; len - 1];
    stream.read_exact(&mut pdu).await.ok()?;
    Some((transaction, header[6], pdu))
}

async fn write_response(stream: &mut TcpStream, transaction: u16, unit: u8, pdu: &[u8]) {
    let mut frame = Vec::with_capacity(7 + pdu.len());
    frame.extend_from_slice(&transaction.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    frame.push(unit);
    frame.extend_from_slice(pdu);
    stream.write_all(&frame).await.ok();
}

/// 对 FC03 应答固定寄存器值，地址 99 返回非法地址异常。
fn holding_response(pdu: &[u8], values: &[u16]) -> Vec<u8> {
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    if address == 99 {
        return vec![0x83, 0x02];
    }
    let count = u16::from_be_bytes([pdu[3], pdu[4]]) as usize;
    let mut response = vec![0x03, (count * 2) as u8];
    for value in values.iter().take(count) {
        response.extend_from_slice(&value.to_be_bytes());
    }
    response
}

async fn spawn_server(values: Vec<u16>, close_after: Option<usize>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let values = values.clone();
            tokio::spawn(async move {
                let mut served = 0;
                while let Some((transaction, unit, pdu)) = read_request(&mut stream).await {
                    let response = holding_response(&pdu, &values);
                    write_response(&mut stream, transaction, unit, &response).await;
                    served += 1;
                    if close_after == Some(served) {
                        break;
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn reads_holding_registers() {
    let addr = spawn_server(vec![250, 1000], None).await;
    let mut link = ModbusLink::new(&tcp_port(addr)).unwrap();

    let words = link
        .read_registers(1, RegisterRegion::Holding, 0, 2, DEADLINE)
        .await
        .unwrap();
    assert_eq!(words, vec![250, 1000]);
    assert!(link.is_connected());

    link.close().await;
    assert!(!link.is_connected());
}

#[tokio::test]
async fn exception_keeps_link_open() {
    let addr = spawn_server(vec![1], None).await;
    let mut link = ModbusLink::new(&tcp_port(addr)).unwrap();

    let err = link
        .read_registers(1, RegisterRegion::Holding, 99, 1, DEADLINE)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Exception(_)));
    assert!(link.is_connected());

    let words = link
        .read_registers(1, RegisterRegion::Holding, 0, 1, DEADLINE)
        .await
        .unwrap();
    assert_eq!(words, vec![1]);
}

#[tokio::test]
async fn refused_connection_is_link_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut link = ModbusLink::new(&tcp_port(addr)).unwrap();
    let err = link
        .read_registers(1, RegisterRegion::Holding, 0, 1, DEADLINE)
        .await
        .unwrap_err();
    assert!(err.is_link_down(), "unexpected error: {err}");
}

#[tokio::test]
async fn silent_device_times_out_and_drops_link() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let mut link = ModbusLink::new(&tcp_port(addr)).unwrap();
    let err = link
        .read_registers(1, RegisterRegion::Holding, 0, 1, DEADLINE)
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Timeout(DEADLINE));
    assert!(!link.is_connected());
}

#[tokio::test]
async fn reconnects_after_peer_closes() {
    let addr = spawn_server(vec![7], Some(1)).await;
    let mut link = ModbusLink::new(&tcp_port(addr)).unwrap();

    let first = link
        .read_registers(1, RegisterRegion::Holding, 0, 1, DEADLINE)
        .await
        .unwrap();
    assert_eq!(first, vec![7]);

    // 对端已关闭：本次失败并丢弃连接
    link.read_registers(1, RegisterRegion::Holding, 0, 1, DEADLINE)
        .await
        .unwrap_err();
    assert!(!link.is_connected());

    let again = link
        .read_registers(1, RegisterRegion::Holding, 0, 1, DEADLINE)
        .await
        .unwrap();
    assert_eq!(again, vec![7]);
}

#[tokio::test]
async fn input_region_rejects_writes() {
    let addr = spawn_server(vec![0], None).await;
    let mut link = ModbusLink::new(&tcp_port(addr)).unwrap();
    let err = link
        .write_registers(1, RegisterRegion::Input, 0, &[1], DEADLINE)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Unsupported(_)));
}
