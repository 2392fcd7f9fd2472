//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为推送源、缓冲适配器与通道组合提供集中错误语义，调用方只需匹配一个枚举即可区分
//!   “可重试”（超时、中断）与“永久性”（关闭、溢出）故障；
//! - 错误在生产者线程与多个读取线程之间共享，因此所有变体均为 `Clone + Send + Sync`。
//!
//! ## 设计要求（What）
//! - 错误码遵循 `<领域>.<语义>` 命名约定，见 [`codes`]；
//! - `Closed` 变体携带可选的失败原因，用于区分“正常关闭”与“上游失败导致关闭”；
//! - 与 `std::io::Error` 双向转换，使字节流适配器可以直接实现 `Read`/`Write`。

use std::{error::Error as StdError, io, sync::Arc, time::Duration};

use thiserror::Error;

/// 上游失败原因的共享表示。
///
/// 同一个原因需要同时交付给所有阻塞中的读取者与后续调用者，故使用 `Arc` 共享。
pub type FailureCause = Arc<dyn StdError + Send + Sync + 'static>;

/// 稳定错误码集合。
///
/// # 设计背景（Why）
/// - 日志与告警按错误码聚合，比匹配自然语言描述更稳定；
/// - 码值一经发布不得修改，新增语义只能追加常量。
pub mod codes {
    /// 生产者写入超出容量且无读取者排空。
    pub const BUFFER_OVERFLOW: &str = "buffer.overflow";
    /// 请求长度超过缓冲容量，永远无法满足。
    pub const BUFFER_INVALID_SIZE: &str = "buffer.invalid_size";
    /// 限时等待到期。
    pub const BUFFER_TIMEOUT: &str = "buffer.timeout";
    /// 通道已关闭（正常关闭或上游失败）。
    pub const CHANNEL_CLOSED: &str = "channel.closed";
    /// 等待或 I/O 被打断。
    pub const CHANNEL_INTERRUPTED: &str = "channel.interrupted";
    /// 发送端底层 I/O 失败。
    pub const TRANSPORT_IO: &str = "transport.io";
}

/// flux 的统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：推送源无法被节流，溢出只能“响亮地失败”；同时读取侧的超时与参数错误只影响
///   单次调用。该枚举把这两类传播路径区分开，便于调用方决定是重试还是放弃整个通道。
/// - **契约 (What)**：
///   - `Overflow`：生产者侧致命错误，缓冲随之关闭，后续读取以 `Closed { cause: Overflow }` 呈现；
///   - `InvalidSize`：编程错误，立即返回、不重试；
///   - `Timeout`：可恢复，调用方可重新发起读取；
///   - `Closed`：永久性，`cause` 保存上游失败原因（若有）；
///   - `Interrupted`：等待被运行时打断，与超时、关闭均不混淆；
///   - `Io`：发送路径的底层 I/O 失败。
/// - **设计权衡 (Trade-offs)**：`io::Error` 不可克隆，故以 `Arc` 包装，代价是一次额外分配。
#[derive(Clone, Debug, Error)]
pub enum FluxError {
    /// 生产者推送的数据超过剩余容量，且没有读取者正在排空缓冲。
    #[error(
        "buffer overflow: {attempted} units pushed into a buffer of capacity {capacity} with no reader draining"
    )]
    Overflow { capacity: usize, attempted: usize },

    /// 请求的长度超过缓冲容量，永远无法被满足。
    #[error("requested {requested} units but the buffer capacity is {capacity}")]
    InvalidSize { requested: usize, capacity: usize },

    /// 限时读取在截止前未获得足够数据或未轮到当前票据。
    #[error("timed out after {timeout:?} waiting for buffered data")]
    Timeout { timeout: Duration },

    /// 通道已关闭；`cause` 非空表示因上游失败或溢出而关闭。
    #[error("channel is closed{}", cause_suffix(.cause))]
    Closed {
        #[source]
        cause: Option<FailureCause>,
    },

    /// 等待或 I/O 被打断。
    #[error("wait was interrupted")]
    Interrupted,

    /// 发送端 I/O 失败。
    #[error("transport i/o failure: {0}")]
    Io(#[source] Arc<io::Error>),
}

fn cause_suffix(cause: &Option<FailureCause>) -> String {
    match cause {
        Some(cause) => format!(": {cause}"),
        None => String::new(),
    }
}

impl FluxError {
    /// 构造不带原因的关闭错误。
    pub fn closed() -> Self {
        FluxError::Closed { cause: None }
    }

    /// 构造携带失败原因的关闭错误。
    pub fn closed_with(cause: FailureCause) -> Self {
        FluxError::Closed { cause: Some(cause) }
    }

    /// 将任意错误包装为 [`FailureCause`]。
    pub fn cause<E>(error: E) -> FailureCause
    where
        E: StdError + Send + Sync + 'static,
    {
        Arc::new(error)
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            FluxError::Overflow { .. } => codes::BUFFER_OVERFLOW,
            FluxError::InvalidSize { .. } => codes::BUFFER_INVALID_SIZE,
            FluxError::Timeout { .. } => codes::BUFFER_TIMEOUT,
            FluxError::Closed { .. } => codes::CHANNEL_CLOSED,
            FluxError::Interrupted => codes::CHANNEL_INTERRUPTED,
            FluxError::Io(_) => codes::TRANSPORT_IO,
        }
    }

    /// 调用方能否在不重建通道的前提下重试。
    ///
    /// 只有超时与中断是局部于单次调用的；其余错误要么是编程错误，要么意味着通道已不可用。
    pub fn is_retryable(&self) -> bool {
        matches!(self, FluxError::Timeout { .. } | FluxError::Interrupted)
    }

    /// 是否为关闭错误。
    pub fn is_closed(&self) -> bool {
        matches!(self, FluxError::Closed { .. })
    }

    /// 若为关闭错误，返回其失败原因。
    pub fn closed_cause(&self) -> Option<&FailureCause> {
        match self {
            FluxError::Closed { cause } => cause.as_ref(),
            _ => None,
        }
    }
}

impl From<io::Error> for FluxError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::Interrupted => FluxError::Interrupted,
            _ => FluxError::Io(Arc::new(value)),
        }
    }
}

impl From<FluxError> for io::Error {
    /// 将 flux 错误映射为标准 I/O 错误。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：`ByteChannelAdapter` 实现 `std::io::Read`/`Write`，需要以 `ErrorKind`
    ///   表达语义，便于 `read_exact` 等标准算法正确处理中断与超时。
    /// - **契约 (What)**：`Io` 变体保留原始 `kind`；其余变体映射为最接近的 `ErrorKind`，
    ///   原始 [`FluxError`] 作为内部错误保留，可通过 `get_ref` + `downcast_ref` 取回。
    fn from(value: FluxError) -> Self {
        let kind = match &value {
            FluxError::Overflow { .. } => io::ErrorKind::Other,
            FluxError::InvalidSize { .. } => io::ErrorKind::InvalidInput,
            FluxError::Timeout { .. } => io::ErrorKind::TimedOut,
            FluxError::Closed { .. } => io::ErrorKind::BrokenPipe,
            FluxError::Interrupted => io::ErrorKind::Interrupted,
            FluxError::Io(err) => err.kind(),
        };
        io::Error::new(kind, value)
    }
}
