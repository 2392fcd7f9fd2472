use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use flux_transport::{FailureCause, FluxError, Message, Observer, PushSource, Subscription};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::ticket::TicketQueue;

/// 报文缓冲适配器：与 [`DataBuffer`](crate::DataBuffer) 同形，但以“整条报文”为单位。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 报文型传输（消息队列、分帧链路）的边界具有语义，一次推送必须对应一次读取；
/// - 读取侧同样需要“最多等 T 取一条”的阻塞拉取语义与到达顺序公平性。
///
/// ## 契约说明（What）
/// - 容量以报文条数计；推送时队列已满即判定溢出，不存在“部分容纳”；
/// - `read_message`：非阻塞，队列为空或已有读取者排队时返回 `None`；
/// - `read_message_timeout`/`read_message_blocking`：原子地出队并返回一整条报文；
/// - 关闭、超时语义与字节缓冲一致。
///
/// ## 风险提示（Trade-offs）
/// - 报文不做任何拆分，单条报文大小不受本缓冲约束，应由传输或编解码层限制。
pub struct MessageBuffer {
    shared: Arc<Shared>,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    changed: Condvar,
}

struct State {
    queue: VecDeque<Message>,
    open: bool,
    cause: Option<FailureCause>,
    waiters: TicketQueue,
    subscription: Option<Subscription>,
}

impl State {
    fn closed_error(&self) -> FluxError {
        FluxError::Closed {
            cause: self.cause.clone(),
        }
    }

    fn ensure_open(&self) -> Result<(), FluxError> {
        if self.open {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    fn shut(&mut self, cause: Option<FailureCause>) -> Option<Subscription> {
        self.open = false;
        if self.cause.is_none() {
            self.cause = cause;
        }
        self.subscription.take()
    }
}

impl MessageBuffer {
    /// 订阅报文源并分配可容纳 `capacity` 条报文的队列。
    pub fn open<S>(source: &S, capacity: usize) -> Result<Self, FluxError>
    where
        S: PushSource<Message> + ?Sized,
    {
        if capacity == 0 {
            return Err(FluxError::InvalidSize {
                requested: 0,
                capacity,
            });
        }

        let shared = Arc::new(Shared {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                open: true,
                cause: None,
                waiters: TicketQueue::new(),
                subscription: None,
            }),
            changed: Condvar::new(),
        });
        let sink = Arc::new(MessageSink {
            shared: Arc::downgrade(&shared),
        });
        let subscription = source.subscribe(sink)?;

        let mut state = shared.state.lock();
        if !state.open {
            let err = state.closed_error();
            drop(state);
            drop(subscription);
            debug!(capacity, error = %err, "message buffer failed during subscription");
            return Err(err);
        }
        state.subscription = Some(subscription);
        drop(state);

        debug!(capacity, "message buffer opened");
        Ok(Self { shared })
    }

    /// 队列容量（报文条数）。
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    pub fn close(&self) -> Result<(), FluxError> {
        self.shared.shut(None, "closed by owner");
        Ok(())
    }

    pub fn available_messages(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn waiting_readers(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    /// 丢弃全部已缓冲报文。
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();
        let discarded = state.queue.len();
        state.queue.clear();
        trace!(discarded, "message buffer flushed");
    }

    /// 非阻塞地取出一条报文；无报文或已有读取者排队时返回 `None`。
    pub fn read_message(&self) -> Result<Option<Message>, FluxError> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        if !state.waiters.is_empty() {
            return Ok(None);
        }
        Ok(state.queue.pop_front())
    }

    /// 限时取出一条完整报文。
    pub fn read_message_timeout(&self, timeout: Duration) -> Result<Message, FluxError> {
        let deadline = Instant::now().checked_add(timeout);
        self.shared.read_one(deadline, timeout)
    }

    /// 无截止时间地取出一条完整报文。
    pub fn read_message_blocking(&self) -> Result<Message, FluxError> {
        self.shared.read_one(None, Duration::MAX)
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        self.shared.shut(None, "dropped");
    }
}

impl Shared {
    fn shut(&self, cause: Option<FailureCause>, reason: &'static str) {
        let mut state = self.state.lock();
        if !state.open {
            return;
        }
        let subscription = state.shut(cause);
        let waiters = state.waiters.len();
        self.changed.notify_all();
        drop(state);
        drop(subscription);
        debug!(reason, waiters, "message buffer closed");
    }

    fn read_one(&self, deadline: Option<Instant>, timeout: Duration) -> Result<Message, FluxError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.waiters.is_empty()
            && let Some(message) = state.queue.pop_front()
        {
            return Ok(message);
        }

        let ticket = state.waiters.enqueue();
        loop {
            if !state.open {
                state.waiters.remove(ticket);
                return Err(state.closed_error());
            }
            if state.waiters.is_head(ticket)
                && let Some(message) = state.queue.pop_front()
            {
                state.waiters.remove(ticket);
                // 队列中可能还有报文留给下一位排队者。
                self.changed.notify_all();
                trace!(len = message.len(), "message buffer read");
                return Ok(message);
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        state.waiters.remove(ticket);
                        self.changed.notify_all();
                        trace!(?timeout, "message buffer read timed out");
                        return Err(FluxError::Timeout { timeout });
                    }
                    self.changed.wait_until(&mut state, deadline);
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    fn write(&self, message: Message) -> Result<(), FluxError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.queue.len() >= self.capacity {
            let err = FluxError::Overflow {
                capacity: self.capacity,
                attempted: state.queue.len() + 1,
            };
            warn!(
                capacity = self.capacity,
                waiters = state.waiters.len(),
                "message buffer overflow, closing"
            );
            let subscription = state.shut(Some(FluxError::cause(err.clone())));
            self.changed.notify_all();
            drop(state);
            drop(subscription);
            return Err(err);
        }
        trace!(len = message.len(), queued = state.queue.len() + 1, "message buffer push");
        state.queue.push_back(message);
        self.changed.notify_all();
        Ok(())
    }
}

struct MessageSink {
    shared: Weak<Shared>,
}

impl Observer<Message> for MessageSink {
    fn on_next(&self, message: Message) -> Result<(), FluxError> {
        match self.shared.upgrade() {
            Some(shared) => shared.write(message),
            None => Err(FluxError::closed()),
        }
    }

    fn on_failure(&self, cause: FailureCause) {
        if let Some(shared) = self.shared.upgrade() {
            warn!(%cause, "message buffer source failed");
            shared.shut(Some(cause), "source failed");
        }
    }

    fn on_complete(&self) {
        debug!("message buffer source completed, queued messages remain readable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_transport::HotSource;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn overflow_is_logged_and_closes_with_cause() {
        let source = HotSource::<Message>::new();
        let buffer = MessageBuffer::open(&source, 1).expect("打开缓冲失败");

        source
            .push(Message::from_static(b"first"))
            .expect("第一条报文应被接收");
        let error = source
            .push(Message::from_static(b"second"))
            .expect_err("超出条数容量必须溢出");
        assert_eq!(error.code(), flux_transport::codes::BUFFER_OVERFLOW);

        let closed = buffer
            .read_message_timeout(Duration::from_millis(10))
            .expect_err("溢出后读取必须失败");
        let cause = closed.closed_cause().expect("关闭错误应携带溢出原因");
        assert!(cause.to_string().starts_with("buffer overflow"));
        assert!(logs_contain("message buffer overflow, closing"));
    }
}
