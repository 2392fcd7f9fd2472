#![deny(unsafe_code)]
#![doc = "flux-transport: 推送式传输的统一契约层。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：串口、套接字或仿真链路都以“回调推送”的方式交付数据，消费者无法节流；本 crate 为它们提供共同语言，使上层缓冲与协议逻辑无需感知具体传输。"]
#![doc = "- **What**：定义 `PushSource`/`Observer`/`Subscription` 订阅契约、`DataSender`/`MessageSender` 发送契约、`Message` 报文类型、统一错误 `FluxError`，以及纯结构组合的 `Channel`。"]
#![doc = "- **How**：额外提供 `HotSource` 内存热源与 `loopback` 成对通道，既是测试夹具，也是仿真设备的最小传输实现。"]

pub mod channel;
pub mod error;
pub mod hot;
pub mod loopback;
pub mod message;
pub mod sender;
pub mod source;

pub use channel::Channel;
pub use error::{FailureCause, FluxError, codes};
pub use hot::HotSource;
pub use loopback::{LoopbackChannel, LoopbackSender};
pub use message::Message;
pub use sender::{DataSender, MessageSender};
pub use source::{Observer, PushSource, Subscription, observer_fn};

/// `Result` 是契约层统一使用的返回别名，错误类型固定为 [`FluxError`]。
pub type Result<T, E = FluxError> = core::result::Result<T, E>;
