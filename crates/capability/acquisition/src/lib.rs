//! # 采集流水线
//!
//! ```text
//! AcquisitionSupervisor
//!       │  每个启用端口一个运行器任务（并行）
//!       ▼
//! PortScheduler ── 独占 LinkTransport，设备之间严格串行
//!       │
//!       ▼
//! DevicePoller ── 逐寄存器读取、重试、解码
//!       │
//!       ▼
//! ReadingQueue（所有端口共享，满时丢弃最旧）──▶ Distribution
//! ```
//!
//! 写入命令经 [`SupervisorHandle::write_register`] 校验编码后，进入所属端口的命令通道，
//! 由该端口调度器在两次轮询之间执行。

mod backoff;
mod poller;
mod scheduler;
mod shutdown;
mod supervisor;
mod write;

pub use backoff::{BackoffPolicy, LinkStatus};
pub use poller::{DevicePoller, PollOutcome};
pub use scheduler::{PortScheduler, SchedulerError};
pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};
pub use supervisor::{
    AcquisitionSupervisor, ShutdownReport, SupervisorConfig, SupervisorError, SupervisorHandle,
};
pub use write::{PortCommand, WriteCommand, WriteError};
