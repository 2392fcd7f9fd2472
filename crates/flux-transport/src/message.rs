use core::ops::Deref;

use bytes::Bytes;

/// 边界具有语义的离散报文。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 字节块（`Bytes`）只关心顺序，边界可以被任意重切；报文则必须“一次推送 = 一次读取”；
/// - 以独立类型区分两者，使得字节源不可能被误接到报文缓冲上，反之亦然。
///
/// ## 契约（What）
/// - 内容不可变，克隆为引用计数复制，不拷贝负载；
/// - 可通过 [`Message::into_bytes`] 无拷贝取回底层 `Bytes`。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Message(Bytes);

impl Message {
    /// 以任意可转换为 `Bytes` 的负载构造报文。
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    /// 以静态字节构造报文，不发生分配。
    pub const fn from_static(payload: &'static [u8]) -> Self {
        Self(Bytes::from_static(payload))
    }

    /// 复制切片内容构造报文。
    pub fn copy_from_slice(payload: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(payload))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Message {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Message {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Message {
    fn from(value: &'static [u8]) -> Self {
        Self(Bytes::from_static(value))
    }
}

impl From<Message> for Bytes {
    fn from(value: Message) -> Self {
        value.0
    }
}
