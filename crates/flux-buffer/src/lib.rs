#![deny(unsafe_code)]
#![doc = "flux-buffer: 推转拉缓冲层。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：推送式传输无法被节流，而协议逻辑需要“读满 N 字节，最多等 T”的阻塞拉取语义；本 crate 位于两者之间，吸收时序差异。"]
#![doc = "- **What**：`DataBuffer` 字节缓冲、`MessageBuffer` 报文缓冲、`Packetizer` 定长重组、`ByteChannelAdapter` 标准 I/O 桥接，以及 `BufferConfig` 声明式配置。"]
#![doc = "- **How**：每个适配器以一把 `parking_lot::Mutex` 加一个 `Condvar` 维护显式状态机，阻塞读取者按票据顺序公平服务；溢出与上游失败一律关闭并携带原因。"]
#![doc = ""]
#![doc = "== 快速上手 =="]
#![doc = "```"]
#![doc = "use std::time::Duration;"]
#![doc = "use flux_buffer::DataReceiver;"]
#![doc = "use flux_transport::{DataSender, loopback};"]
#![doc = ""]
#![doc = "let (host, device) = loopback::data_pair();"]
#![doc = "let buffer = device.open_data_buffer(16)?;"]
#![doc = "host.send_data(b\"ping\")?;"]
#![doc = "let mut reply = [0u8; 4];"]
#![doc = "buffer.read_data_timeout(&mut reply, Duration::from_millis(100))?;"]
#![doc = "assert_eq!(&reply, b\"ping\");"]
#![doc = "# Ok::<(), flux_transport::FluxError>(())"]
#![doc = "```"]

pub mod config;
pub mod data_buffer;
pub mod message_buffer;
pub mod packetizer;
pub mod receiver;
pub mod stream;
pub mod ticket;

pub use config::{BufferConfig, ConfigError};
pub use data_buffer::DataBuffer;
pub use message_buffer::MessageBuffer;
pub use packetizer::Packetizer;
pub use receiver::{DataReceiver, MessageReceiver};
pub use stream::ByteChannelAdapter;
pub use ticket::{Ticket, TicketQueue};
