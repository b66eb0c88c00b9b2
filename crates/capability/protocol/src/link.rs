//! 基于 tokio-modbus 的链路实现。

use crate::error::TransportError;
use crate::serial;
use crate::transport::LinkTransport;
use async_trait::async_trait;
use domain::{LinkEndpoint, PortConfig, RegisterRegion, TransportKind};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// 单条 Modbus 链路。
///
/// 首次请求时建链；超时或链路级错误后丢弃连接，下次请求重新建立。
pub struct ModbusLink {
    port: String,
    kind: TransportKind,
    endpoint: LinkEndpoint,
    connect_timeout: Duration,
    /// 仅串口：请求前的帧间静默
    frame_gap: Option<Duration>,
    ctx: Option<Context>,
}

impl std::fmt::Debug for ModbusLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusLink")
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("connected", &self.ctx.is_some())
            .finish()
    }
}

impl ModbusLink {
    pub fn new(config: &PortConfig) -> Result<Self, TransportError> {
        let frame_gap = match (config.transport, &config.endpoint) {
            (TransportKind::Tcp | TransportKind::RtuTcp, LinkEndpoint::Network { .. }) => None,
            (TransportKind::RtuSerial, LinkEndpoint::Serial(settings)) => {
                Some(serial::frame_gap(settings))
            }
            (kind, endpoint) => {
                return Err(TransportError::InvalidConfig(format!(
                    "port {}: transport {} cannot use endpoint {}",
                    config.name,
                    kind.as_str(),
                    endpoint
                )));
            }
        };

        Ok(Self {
            port: config.name.clone(),
            kind: config.transport,
            endpoint: config.endpoint.clone(),
            connect_timeout: config.connect_timeout,
            frame_gap,
            ctx: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn context(&mut self) -> Result<&mut Context, TransportError> {
        if self.ctx.is_none() {
            let ctx = open(
                self.port.clone(),
                self.kind,
                self.endpoint.clone(),
                self.connect_timeout,
            )
            .await?;
            info!(
                target: "mbus.protocol",
                port = %self.port,
                transport = self.kind.as_str(),
                endpoint = %self.endpoint,
                "link connected"
            );
            self.ctx = Some(ctx);
        }
        self.ctx
            .as_mut()
            .ok_or_else(|| TransportError::LinkDown("link not connected".to_string()))
    }

    fn settle<T>(
        &mut self,
        outcome: Result<Result<Result<T, ExceptionCode>, tokio_modbus::Error>, tokio::time::error::Elapsed>,
        deadline: Duration,
    ) -> Result<T, TransportError> {
        let err = match outcome {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(code))) => TransportError::Exception(format!("{:?}", code)),
            Ok(Err(err)) => TransportError::from_modbus(err, deadline),
            Err(_) => TransportError::Timeout(deadline),
        };
        if err.invalidates_link() && self.ctx.take().is_some() {
            warn!(
                target: "mbus.protocol",
                port = %self.port,
                error = %err,
                "link dropped, reconnecting on next request"
            );
        }
        Err(err)
    }
}

/// 建立一条新连接。只接收拥有所有权的参数，`ModbusLink` 本身不是 `Sync`。
async fn open(
    port: String,
    kind: TransportKind,
    endpoint: LinkEndpoint,
    connect_timeout: Duration,
) -> Result<Context, TransportError> {
    // 从站地址在每次请求前设置
    let slave = Slave(0);
    match &endpoint {
        LinkEndpoint::Network { host, port: tcp_port } => {
            let stream = timeout(connect_timeout, TcpStream::connect((host.as_str(), *tcp_port)))
                .await
                .map_err(|_| {
                    TransportError::LinkDown(format!(
                        "connect to {} timed out after {:?}",
                        endpoint, connect_timeout
                    ))
                })?
                .map_err(|err| TransportError::LinkDown(format!("connect to {}: {}", endpoint, err)))?;
            if let Err(err) = stream.set_nodelay(true) {
                debug!(target: "mbus.protocol", port = %port, error = %err, "set_nodelay failed");
            }
            Ok(match kind {
                TransportKind::RtuTcp => rtu::attach_slave(stream, slave),
                _ => tcp::attach_slave(stream, slave),
            })
        }
        LinkEndpoint::Serial(settings) => {
            let stream = serial::open(settings, connect_timeout)?;
            Ok(rtu::attach_slave(stream, slave))
        }
    }
}

async fn frame_silence(gap: Option<Duration>) {
    if let Some(gap) = gap {
        sleep(gap).await;
    }
}

#[async_trait]
impl LinkTransport for ModbusLink {
    async fn read_registers(
        &mut self,
        unit: u8,
        region: RegisterRegion,
        start: u16,
        count: u16,
        deadline: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        frame_silence(self.frame_gap).await;
        let ctx = self.context().await?;
        ctx.set_slave(Slave(unit));

        let request = async {
            match region {
                RegisterRegion::Coil => ctx
                    .read_coils(start, count)
                    .await
                    .map(|res| res.map(|bits| bits_to_words(bits, count))),
                RegisterRegion::DiscreteInput => ctx
                    .read_discrete_inputs(start, count)
                    .await
                    .map(|res| res.map(|bits| bits_to_words(bits, count))),
                RegisterRegion::Holding => ctx.read_holding_registers(start, count).await,
                RegisterRegion::Input => ctx.read_input_registers(start, count).await,
            }
        };
        let outcome = timeout(deadline, request).await;
        self.settle(outcome, deadline)
    }

    async fn write_registers(
        &mut self,
        unit: u8,
        region: RegisterRegion,
        start: u16,
        values: &[u16],
        deadline: Duration,
    ) -> Result<(), TransportError> {
        if !region.is_writable() {
            return Err(TransportError::Unsupported(format!(
                "{} region is read-only",
                region.as_str()
            )));
        }
        if values.is_empty() {
            return Err(TransportError::Unsupported("empty write".to_string()));
        }

        frame_silence(self.frame_gap).await;
        let ctx = self.context().await?;
        ctx.set_slave(Slave(unit));

        let request = async {
            match (region, values) {
                (RegisterRegion::Coil, [single]) => ctx.write_single_coil(start, *single != 0).await,
                (RegisterRegion::Coil, many) => {
                    let bits: Vec<bool> = many.iter().map(|word| *word != 0).collect();
                    ctx.write_multiple_coils(start, &bits).await
                }
                (_, [single]) => ctx.write_single_register(start, *single).await,
                (_, many) => ctx.write_multiple_registers(start, many).await,
            }
        };
        let outcome = timeout(deadline, request).await;
        self.settle(outcome, deadline)
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            match timeout(DISCONNECT_TIMEOUT, ctx.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(target: "mbus.protocol", port = %self.port, error = %err, "disconnect failed");
                }
                Err(_) => {
                    debug!(target: "mbus.protocol", port = %self.port, "disconnect timed out");
                }
            }
            info!(target: "mbus.protocol", port = %self.port, "link closed");
        }
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

fn bits_to_words(bits: Vec<bool>, count: u16) -> Vec<u16> {
    bits.into_iter()
        .take(usize::from(count))
        .map(u16::from)
        .collect()
}
