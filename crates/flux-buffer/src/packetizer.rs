use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use bytes::{BufMut, Bytes, BytesMut};
use flux_transport::{FailureCause, FluxError, Observer, PushSource, Subscription};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// 定长重组器：把上游任意分块的字节流重切为恰好 `block_size` 字节的块。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 定长帧协议（固定长度的应答、采样帧）希望每次回调拿到恰好一帧，
///   而串口驱动的分块边界完全取决于时序；
/// - 重组器本身仍是 [`PushSource`]，可以直接接在缓冲适配器前面，不改变下游代码。
///
/// ## 逻辑（How）
/// - 累加器为 `block_size` 字节的 `BytesMut`；累加器为空时，上游块中完整的部分通过
///   `Bytes::split_to` 零拷贝切出，只有尾部残余才拷贝进累加器；
/// - 第一个下游订阅者出现时才订阅上游，最后一个订阅者退订时取消上游订阅；
/// - 上游订阅在锁外建立与取消：已终止的源可能在 `subscribe` 内同步回调本对象。
///
/// ## 契约（What）
/// - 只发出满块，从不隐式发出半块；残余可通过 [`Packetizer::take_partial`] 取回；
/// - 上游失败或完成会转发给全部下游订阅者并结束上游订阅，此后的新订阅者将触发一次全新的上游订阅；
/// - 上游订阅建立失败时，首个订阅者收到 `Err`，建立期间加入的订阅者收到同一错误的 `on_failure`；
/// - 发出的块按上游顺序交付，向下游交付时不持有内部锁。
///
/// ## 风险提示（Trade-offs）
/// - 残余字节跨上游订阅保留；需要丢弃时由持有者调用 `take_partial`。
pub struct Packetizer<S> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    upstream: S,
    block_size: usize,
    state: Mutex<State>,
    next_id: AtomicU64,
}

struct State {
    accumulator: BytesMut,
    subscribers: Vec<(u64, Arc<dyn Observer<Bytes>>)>,
    upstream: Option<Subscription>,
    subscribing: bool,
}

impl<S> Clone for Packetizer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Packetizer<S>
where
    S: PushSource<Bytes> + 'static,
{
    /// 包装上游源；`block_size == 0` 返回 [`FluxError::InvalidSize`]。
    pub fn new(upstream: S, block_size: usize) -> Result<Self, FluxError> {
        if block_size == 0 {
            return Err(FluxError::InvalidSize {
                requested: 0,
                capacity: block_size,
            });
        }
        Ok(Self {
            inner: Arc::new(Inner {
                upstream,
                block_size,
                state: Mutex::new(State {
                    accumulator: BytesMut::with_capacity(block_size),
                    subscribers: Vec::new(),
                    upstream: None,
                    subscribing: false,
                }),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// 累加器中尚未凑满一块的字节数。
    pub fn retained(&self) -> usize {
        self.inner.state.lock().accumulator.len()
    }

    /// 取走累加器中的残余字节，不向下游发出。
    pub fn take_partial(&self) -> Option<Bytes> {
        let mut state = self.inner.state.lock();
        if state.accumulator.is_empty() {
            return None;
        }
        let partial = state.accumulator.split().freeze();
        trace!(len = partial.len(), "packetizer partial block taken");
        Some(partial)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// 是否持有活跃的上游订阅。
    pub fn is_upstream_active(&self) -> bool {
        self.inner.state.lock().upstream.is_some()
    }
}

impl<S> Inner<S>
where
    S: PushSource<Bytes> + 'static,
{
    /// 下游为空时交还上游订阅，调用方须在锁外丢弃。
    fn unsubscribe(&self, id: u64) -> Option<Subscription> {
        let mut state = self.state.lock();
        state.subscribers.retain(|(candidate, _)| *candidate != id);
        if state.subscribers.is_empty() {
            let upstream = state.upstream.take();
            if upstream.is_some() {
                debug!("packetizer last subscriber left, cancelling upstream");
            }
            return upstream;
        }
        None
    }

    /// 以 `id` 的名义建立上游订阅。
    ///
    /// 失败时 `id` 由调用方以 `Err` 收到；期间加入的其余订阅者已经拿到 `Ok`，
    /// 因此摘下它们并以 `on_failure` 交付同一错误，重组器回到可重新订阅的空状态。
    fn attach_upstream(self: &Arc<Self>, id: u64) -> Result<(), FluxError> {
        let relay = Arc::new(Relay {
            inner: Arc::downgrade(self),
        });
        let result = self.upstream.subscribe(relay);

        let mut state = self.state.lock();
        state.subscribing = false;
        match result {
            Ok(subscription) => {
                // 订阅期间下游可能已全部离开，或上游同步终止清空了订阅者。
                if state.subscribers.is_empty() {
                    drop(state);
                    drop(subscription);
                    return Ok(());
                }
                state.upstream = Some(subscription);
                debug!(
                    block_size = self.block_size,
                    "packetizer subscribed upstream"
                );
                Ok(())
            }
            Err(err) => {
                let stranded = std::mem::take(&mut state.subscribers)
                    .into_iter()
                    .filter(|(candidate, _)| *candidate != id)
                    .collect::<Vec<_>>();
                drop(state);
                if !stranded.is_empty() {
                    warn!(
                        stranded = stranded.len(),
                        error = %err,
                        "packetizer upstream attach failed, failing waiting subscribers"
                    );
                    let cause = FluxError::cause(err.clone());
                    for (_, observer) in stranded {
                        observer.on_failure(Arc::clone(&cause));
                    }
                }
                Err(err)
            }
        }
    }

    /// 把上游块切入累加器，返回本次凑满的全部块。
    fn chunk(&self, state: &mut State, mut block: Bytes) -> Vec<Bytes> {
        let size = self.block_size;
        let mut ready = Vec::new();
        if !state.accumulator.is_empty() {
            let fill = (size - state.accumulator.len()).min(block.len());
            state.accumulator.put_slice(&block.split_to(fill));
            if state.accumulator.len() == size {
                ready.push(state.accumulator.split().freeze());
            }
        }
        while block.len() >= size {
            ready.push(block.split_to(size));
        }
        if !block.is_empty() {
            state.accumulator.put_slice(&block);
        }
        ready
    }

    fn terminate(&self) -> Vec<(u64, Arc<dyn Observer<Bytes>>)> {
        let (subscribers, upstream) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.subscribers),
                state.upstream.take(),
            )
        };
        drop(upstream);
        subscribers
    }
}

impl<S> PushSource<Bytes> for Packetizer<S>
where
    S: PushSource<Bytes> + 'static,
{
    fn subscribe(
        &self,
        observer: Arc<dyn Observer<Bytes>>,
    ) -> flux_transport::Result<Subscription> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let attach = {
            let mut state = self.inner.state.lock();
            state.subscribers.push((id, observer));
            let attach = state.upstream.is_none() && !state.subscribing;
            if attach {
                state.subscribing = true;
            }
            attach
        };

        if attach {
            self.inner.attach_upstream(id)?;
        }

        let weak: Weak<Inner<S>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                drop(inner.unsubscribe(id));
            }
        }))
    }
}

/// 挂在上游的中继观察者。
struct Relay<S> {
    inner: Weak<Inner<S>>,
}

impl<S> Observer<Bytes> for Relay<S>
where
    S: PushSource<Bytes> + 'static,
{
    fn on_next(&self, block: Bytes) -> flux_transport::Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(FluxError::closed());
        };
        let incoming = block.len();
        let (ready, subscribers) = {
            let mut state = inner.state.lock();
            let ready = inner.chunk(&mut state, block);
            let subscribers = state
                .subscribers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect::<Vec<_>>();
            (ready, subscribers)
        };
        trace!(incoming, emitted = ready.len(), "packetizer relayed block");

        let mut first_error = None;
        for packet in ready {
            for observer in &subscribers {
                if let Err(err) = observer.on_next(packet.clone())
                    && first_error.is_none()
                {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn on_failure(&self, cause: FailureCause) {
        if let Some(inner) = self.inner.upgrade() {
            let subscribers = inner.terminate();
            debug!(subscribers = subscribers.len(), %cause, "packetizer upstream failed");
            for (_, observer) in subscribers {
                observer.on_failure(Arc::clone(&cause));
            }
        }
    }

    fn on_complete(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let subscribers = inner.terminate();
            debug!(subscribers = subscribers.len(), "packetizer upstream completed");
            for (_, observer) in subscribers {
                observer.on_complete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_transport::HotSource;

    #[test]
    fn zero_block_size_is_rejected() {
        let error = Packetizer::new(HotSource::<Bytes>::new(), 0)
            .err()
            .expect("块大小为 0 必须被拒绝");
        assert!(matches!(error, FluxError::InvalidSize { .. }));
    }

    #[test]
    fn aligned_block_is_split_without_accumulating() {
        let packetizer = Packetizer::new(HotSource::<Bytes>::new(), 2).expect("构造失败");
        let mut state = packetizer.inner.state.lock();
        let ready = packetizer
            .inner
            .chunk(&mut state, Bytes::from_static(b"abcdef"));
        assert_eq!(ready, vec![&b"ab"[..], &b"cd"[..], &b"ef"[..]]);
        assert!(state.accumulator.is_empty());
    }
}
