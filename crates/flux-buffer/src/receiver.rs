//! 接收半部的便捷扩展。
//!
//! 任何 `PushSource<Bytes>` 都可以直接 `open_data_buffer`，任何 `PushSource<Message>`
//! 都可以直接 `open_message_buffer`，调用方无需记住适配器类型的名字。

use bytes::Bytes;
use flux_transport::{FluxError, Message, PushSource};

use crate::{BufferConfig, DataBuffer, MessageBuffer, Packetizer};

/// 字节接收半部的扩展方法。
pub trait DataReceiver: PushSource<Bytes> {
    /// 打开容量为 `capacity` 字节的缓冲。
    fn open_data_buffer(&self, capacity: usize) -> Result<DataBuffer, FluxError> {
        DataBuffer::open(self, capacity)
    }

    /// 以配置中的 `data_capacity` 打开缓冲。
    fn open_data_buffer_with(&self, config: &BufferConfig) -> Result<DataBuffer, FluxError> {
        self.open_data_buffer(config.data_capacity)
    }

    /// 以 `block_size` 字节为单位重组本源的字节流。
    fn open_packetized(self, block_size: usize) -> Result<Packetizer<Self>, FluxError>
    where
        Self: Sized + 'static,
    {
        Packetizer::new(self, block_size)
    }
}

impl<S> DataReceiver for S where S: PushSource<Bytes> + ?Sized {}

/// 报文接收半部的扩展方法。
pub trait MessageReceiver: PushSource<Message> {
    /// 打开可容纳 `capacity` 条报文的缓冲。
    fn open_message_buffer(&self, capacity: usize) -> Result<MessageBuffer, FluxError> {
        MessageBuffer::open(self, capacity)
    }

    /// 以配置中的 `message_capacity` 打开缓冲。
    fn open_message_buffer_with(&self, config: &BufferConfig) -> Result<MessageBuffer, FluxError> {
        self.open_message_buffer(config.message_capacity)
    }
}

impl<S> MessageReceiver for S where S: PushSource<Message> + ?Sized {}
