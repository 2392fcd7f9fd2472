use std::sync::Arc;

use crate::Message;

/// 字节块发送能力。
///
/// # 契约说明（What）
/// - `send_data` 将整个块交给传输，返回实际写出的字节数；
/// - 传输层失败以 [`FluxError::Io`](crate::FluxError::Io) 或 `Closed` 返回，本层不做重试。
pub trait DataSender: Send + Sync {
    /// 发送一个字节块。
    fn send_data(&self, block: &[u8]) -> crate::Result<usize>;
}

/// 报文发送能力，报文边界由传输保持。
pub trait MessageSender: Send + Sync {
    /// 发送一个完整报文。
    fn send_message(&self, message: Message) -> crate::Result<()>;
}

impl<S> DataSender for Arc<S>
where
    S: DataSender + ?Sized,
{
    fn send_data(&self, block: &[u8]) -> crate::Result<usize> {
        (**self).send_data(block)
    }
}

impl<S> DataSender for &S
where
    S: DataSender + ?Sized,
{
    fn send_data(&self, block: &[u8]) -> crate::Result<usize> {
        (**self).send_data(block)
    }
}

impl<S> MessageSender for Arc<S>
where
    S: MessageSender + ?Sized,
{
    fn send_message(&self, message: Message) -> crate::Result<()> {
        (**self).send_message(message)
    }
}

impl<S> MessageSender for &S
where
    S: MessageSender + ?Sized,
{
    fn send_message(&self, message: Message) -> crate::Result<()> {
        (**self).send_message(message)
    }
}
