use std::sync::Arc;

use crate::{DataSender, Message, MessageSender, Observer, PushSource, Subscription};

/// 发送半部与接收半部的纯结构组合。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 协议逻辑通常需要“发一条命令、读一条应答”的全双工交互，`Channel` 把两个单向能力
///   合成一个对象交给调用方，避免在接口上同时传递两个句柄；
/// - 组合不引入任何缓冲：读取侧的缓冲由调用方按需打开（参见 `flux-buffer`）。
///
/// ## 逻辑 (How)
/// - `S: DataSender` 时实现 [`DataSender`]，`S: MessageSender` 时实现 [`MessageSender`]；
/// - `R: PushSource<T>` 时实现 [`PushSource<T>`]；全部方法直接委托给对应半部。
///
/// ## 契约 (What)
/// - `sender`/`receiver`：借用对应半部；
/// - `into_parts`：拆解为两个半部，交还所有权。
#[derive(Clone, Debug, Default)]
pub struct Channel<S, R> {
    sender: S,
    receiver: R,
}

impl<S, R> Channel<S, R> {
    pub fn new(sender: S, receiver: R) -> Self {
        Self { sender, receiver }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn into_parts(self) -> (S, R) {
        (self.sender, self.receiver)
    }
}

impl<S, R> DataSender for Channel<S, R>
where
    S: DataSender,
    R: Send + Sync,
{
    fn send_data(&self, block: &[u8]) -> crate::Result<usize> {
        self.sender.send_data(block)
    }
}

impl<S, R> MessageSender for Channel<S, R>
where
    S: MessageSender,
    R: Send + Sync,
{
    fn send_message(&self, message: Message) -> crate::Result<()> {
        self.sender.send_message(message)
    }
}

impl<T, S, R> PushSource<T> for Channel<S, R>
where
    S: Send + Sync,
    R: PushSource<T>,
{
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> crate::Result<Subscription> {
        self.receiver.subscribe(observer)
    }
}
