//! 成对的内存回环通道。
//!
//! 两端各自持有一个 [`HotSource`] 作为接收半部，发送半部则推送进对端的源；
//! 用于在没有真实设备时驱动协议逻辑与仿真硬件。

use bytes::Bytes;
use tracing::trace;

use crate::{Channel, DataSender, HotSource, Message, MessageSender};

/// 回环通道的一端。
pub type LoopbackChannel<T> = Channel<LoopbackSender<T>, HotSource<T>>;

/// 向对端热源推送数据的发送半部。
#[derive(Clone)]
pub struct LoopbackSender<T> {
    target: HotSource<T>,
}

impl<T> LoopbackSender<T> {
    /// 对端接收半部，常用于在测试中注入失败。
    pub fn target(&self) -> &HotSource<T> {
        &self.target
    }
}

impl DataSender for LoopbackSender<Bytes> {
    fn send_data(&self, block: &[u8]) -> crate::Result<usize> {
        trace!(len = block.len(), "loopback sending data");
        self.target.push(Bytes::copy_from_slice(block))?;
        Ok(block.len())
    }
}

impl MessageSender for LoopbackSender<Message> {
    fn send_message(&self, message: Message) -> crate::Result<()> {
        trace!(len = message.len(), "loopback sending message");
        self.target.push(message)
    }
}

fn pair<T>() -> (LoopbackChannel<T>, LoopbackChannel<T>)
where
    T: Clone + Send + 'static,
{
    let left = HotSource::new();
    let right = HotSource::new();
    (
        Channel::new(
            LoopbackSender {
                target: right.clone(),
            },
            left.clone(),
        ),
        Channel::new(LoopbackSender { target: left }, right),
    )
}

/// 构造一对字节回环端点：一端写出的字节块按序出现在另一端的接收源上。
pub fn data_pair() -> (LoopbackChannel<Bytes>, LoopbackChannel<Bytes>) {
    pair()
}

/// 构造一对报文回环端点，报文边界原样保持。
pub fn message_pair() -> (LoopbackChannel<Message>, LoopbackChannel<Message>) {
    pair()
}
