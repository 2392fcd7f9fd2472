use std::{
    cmp,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use bytes::{Buf, Bytes, BytesMut};
use flux_transport::{FailureCause, FluxError, Observer, PushSource, Subscription};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::ticket::TicketQueue;

/// 字节缓冲适配器：把推送式字节源转换为有界、公平、可超时的阻塞读取。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 串口等传输只能以回调推送字节块，且无法被节流；协议逻辑却需要“读满 N 字节，最多等 T”
///   这样的拉取语义；
/// - 字节顺序必须保持，但推送时的分块边界没有意义，读取可以任意重切。
///
/// ## 逻辑 (How)
/// - 全部可变状态（存储区、票据队列、开闭标记、失败原因、订阅句柄）由一把
///   `parking_lot::Mutex` 保护，配合一个 `Condvar` 在数据到达、空间释放、关闭时广播；
/// - 推送回调通过 `Weak` 引用访问状态，适配器被丢弃后回调自动失效；
/// - 限时读取在队尾登记票据，每次被唤醒都重新检查“仍然打开 / 位于队首 / 数据足够”三个条件，
///   并以固定截止时刻重新计算剩余等待时长，容忍伪唤醒；
/// - 推送的块超过剩余空间时：若有读取者在排队，则分段写入并等待队首读取者排空；
///   若无人排队，判定溢出，缓冲以溢出为原因关闭。
///
/// ## 契约 (What)
/// - `open`：订阅源并分配 `capacity` 字节的存储；源在订阅期间即报告失败时构造失败；
/// - `available_bytes`/`flush`/`read_data`/`is_open`：非阻塞；
/// - `read_data_timeout`/`read_data_blocking`：读满整个目标切片，否则返回超时或关闭错误；
/// - `close`：幂等，唤醒全部等待者并退订；`Drop` 时自动关闭。
///
/// ## 注意事项 (Trade-offs)
/// - 关闭后即使存储区仍有数据，读取也一律返回关闭错误，确保“关闭对所有读取者可见”；
/// - 生产者在等待排空时会阻塞推送源的投递线程，这是无法节流的传输下唯一不丢数据的选择。
pub struct DataBuffer {
    shared: Arc<Shared>,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    changed: Condvar,
}

struct State {
    store: BytesMut,
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

    /// 标记关闭并交出订阅句柄；句柄必须在释放锁之后再取消。
    fn shut(&mut self, cause: Option<FailureCause>) -> Option<Subscription> {
        self.open = false;
        if self.cause.is_none() {
            self.cause = cause;
        }
        self.subscription.take()
    }
}

impl DataBuffer {
    /// 订阅字节源并分配 `capacity` 字节的存储区。
    ///
    /// # 契约
    /// - `capacity == 0` 返回 [`FluxError::InvalidSize`]；
    /// - `subscribe` 的错误原样返回；
    /// - 若源在订阅过程中同步报告失败（例如已终止的源重放失败），返回携带该原因的关闭错误。
    pub fn open<S>(source: &S, capacity: usize) -> Result<Self, FluxError>
    where
        S: PushSource<Bytes> + ?Sized,
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
                store: BytesMut::with_capacity(capacity),
                open: true,
                cause: None,
                waiters: TicketQueue::new(),
                subscription: None,
            }),
            changed: Condvar::new(),
        });
        let sink = Arc::new(DataSink {
            shared: Arc::downgrade(&shared),
        });
        let subscription = source.subscribe(sink)?;

        let mut state = shared.state.lock();
        if !state.open {
            let err = state.closed_error();
            drop(state);
            drop(subscription);
            debug!(capacity, error = %err, "data buffer failed during subscription");
            return Err(err);
        }
        state.subscription = Some(subscription);
        drop(state);

        debug!(capacity, "data buffer opened");
        Ok(Self { shared })
    }

    /// 存储区容量（字节）。
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    /// 关闭缓冲，唤醒全部等待者并退订源；重复关闭为空操作。
    pub fn close(&self) -> Result<(), FluxError> {
        self.shared.shut(None, "closed by owner");
        Ok(())
    }

    /// 当前已缓冲的字节数。
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().store.len()
    }

    /// 正在排队的阻塞读取者数量。
    pub fn waiting_readers(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    /// 丢弃全部已缓冲字节，不影响开闭状态与等待中的票据。
    pub fn flush(&self) {
        let mut state = self.shared.state.lock();
        let discarded = state.store.len();
        state.store.clear();
        self.shared.changed.notify_all();
        trace!(discarded, "data buffer flushed");
    }

    /// 非阻塞读取：拷贝 `min(已缓冲, dest.len())` 字节并压缩存储区。
    ///
    /// 若已有读取者在排队，返回 `0` 而不插队。
    pub fn read_data(&self, dest: &mut [u8]) -> Result<usize, FluxError> {
        let mut state = self.shared.state.lock();
        state.ensure_open()?;
        if !state.waiters.is_empty() {
            return Ok(0);
        }
        let count = cmp::min(state.store.len(), dest.len());
        if count > 0 {
            state.store.copy_to_slice(&mut dest[..count]);
            self.shared.changed.notify_all();
        }
        trace!(count, "data buffer non-blocking read");
        Ok(count)
    }

    /// 限时读满 `dest`。
    ///
    /// # 契约
    /// - `dest.len() > capacity`：立即返回 [`FluxError::InvalidSize`]；
    /// - 截止前未满足：移除票据并返回 [`FluxError::Timeout`]，不影响其他等待者；
    /// - 缓冲关闭：返回携带失败原因的 [`FluxError::Closed`]。
    pub fn read_data_timeout(&self, dest: &mut [u8], timeout: Duration) -> Result<(), FluxError> {
        let deadline = Instant::now().checked_add(timeout);
        self.shared.read_exact(dest, deadline, timeout)
    }

    /// 无截止时间地读满 `dest`，仅在数据到达或缓冲关闭时返回。
    pub fn read_data_blocking(&self, dest: &mut [u8]) -> Result<(), FluxError> {
        self.shared.read_exact(dest, None, Duration::MAX)
    }
}

impl Drop for DataBuffer {
    fn drop(&mut self) {
        self.shared.shut(None, "dropped");
    }
}

impl Shared {
    /// 关闭缓冲；订阅句柄在释放锁之后取消，避免与源自身的锁形成环。
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
        debug!(reason, waiters, "data buffer closed");
    }

    fn read_exact(
        &self,
        dest: &mut [u8],
        deadline: Option<Instant>,
        timeout: Duration,
    ) -> Result<(), FluxError> {
        let requested = dest.len();
        if requested > self.capacity {
            return Err(FluxError::InvalidSize {
                requested,
                capacity: self.capacity,
            });
        }

        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.waiters.is_empty() && state.store.len() >= requested {
            self.take(&mut state, dest);
            return Ok(());
        }

        let ticket = state.waiters.enqueue();
        trace!(
            requested,
            waiters = state.waiters.len(),
            "data buffer reader queued"
        );
        loop {
            if !state.open {
                state.waiters.remove(ticket);
                return Err(state.closed_error());
            }
            if state.waiters.is_head(ticket) && state.store.len() >= requested {
                state.waiters.remove(ticket);
                self.take(&mut state, dest);
                return Ok(());
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        state.waiters.remove(ticket);
                        self.changed.notify_all();
                        trace!(requested, ?timeout, "data buffer read timed out");
                        return Err(FluxError::Timeout { timeout });
                    }
                    self.changed.wait_until(&mut state, deadline);
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    fn take(&self, state: &mut State, dest: &mut [u8]) {
        state.store.copy_to_slice(dest);
        self.changed.notify_all();
        trace!(count = dest.len(), remaining = state.store.len(), "data buffer read");
    }

    /// 生产者路径：写入推送的字节块。
    fn write(&self, mut block: Bytes) -> Result<(), FluxError> {
        let mut state = self.state.lock();
        loop {
            state.ensure_open()?;
            let free = self.capacity - state.store.len();
            if block.len() <= free {
                state.store.extend_from_slice(&block);
                self.changed.notify_all();
                trace!(len = block.len(), occupancy = state.store.len(), "data buffer push");
                return Ok(());
            }

            if state.waiters.is_empty() {
                let err = FluxError::Overflow {
                    capacity: self.capacity,
                    attempted: state.store.len() + block.len(),
                };
                warn!(
                    capacity = self.capacity,
                    occupancy = state.store.len(),
                    incoming = block.len(),
                    "data buffer overflow, closing"
                );
                let subscription = state.shut(Some(FluxError::cause(err.clone())));
                self.changed.notify_all();
                drop(state);
                drop(subscription);
                return Err(err);
            }

            let chunk = block.split_to(free);
            state.store.extend_from_slice(&chunk);
            self.changed.notify_all();
            trace!(
                written = chunk.len(),
                pending = block.len(),
                "data buffer full, waiting for readers to drain"
            );
            self.changed.wait(&mut state);
        }
    }
}

/// 交给推送源的观察者；只持有弱引用，避免订阅反向延长缓冲的生命周期。
struct DataSink {
    shared: Weak<Shared>,
}

impl Observer<Bytes> for DataSink {
    fn on_next(&self, block: Bytes) -> Result<(), FluxError> {
        match self.shared.upgrade() {
            Some(shared) => shared.write(block),
            None => Err(FluxError::closed()),
        }
    }

    fn on_failure(&self, cause: FailureCause) {
        if let Some(shared) = self.shared.upgrade() {
            warn!(%cause, "data buffer source failed");
            shared.shut(Some(cause), "source failed");
        }
    }

    fn on_complete(&self) {
        debug!("data buffer source completed, buffered bytes remain readable");
    }
}
