use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{FailureCause, FluxError, Observer, PushSource, Subscription};

/// 内存中的“热”推送源：数据只交付给推送时刻已存在的订阅者。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 真实传输（串口事件监听、套接字读循环）都是“热”的：没人订阅时数据即被丢弃；
///   `HotSource` 以最小代价复刻这一语义，作为测试夹具、仿真设备与 [`loopback`](crate::loopback)
///   通道的底座；
/// - 由持有者在任意线程调用 [`HotSource::push`]，模拟传输的 I/O 线程。
///
/// ## 逻辑（How）
/// - `state` 保存订阅者列表与终止标记，仅在增删订阅者时短暂持有；
/// - `delivery` 串行化所有投递，保证每个订阅者看到的顺序与推送顺序一致；
/// - 投递时先快照订阅者列表再释放 `state`，订阅者在回调中退订不会与本锁冲突。
///
/// ## 契约（What）
/// - `push`：交付给全部当前订阅者，返回第一个观察者错误（其余订阅者仍会收到数据）；
/// - `fail`/`complete`：终止事件至多一次，成功返回 `true`；终止后 `push` 返回 `Closed`；
/// - 终止后的新订阅会同步收到同一终止事件，并获得空订阅句柄。
///
/// ## 注意事项（Trade-offs）
/// - 观察者在 `on_next` 中再次向同一源 `push` 会因 `delivery` 不可重入而死锁；
/// - 某个观察者阻塞（例如缓冲等待排空）会阻塞所有后续投递，这与真实 I/O 线程的行为一致。
pub struct HotSource<T> {
    inner: Arc<HotInner<T>>,
}

struct HotInner<T> {
    state: Mutex<HotState<T>>,
    delivery: Mutex<()>,
    next_id: AtomicU64,
}

struct HotState<T> {
    observers: Vec<(u64, Arc<dyn Observer<T>>)>,
    terminal: Option<Terminal>,
}

#[derive(Clone)]
enum Terminal {
    Failed(FailureCause),
    Completed,
}

impl<T> Clone for HotSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for HotSource<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(HotInner {
                state: Mutex::new(HotState {
                    observers: Vec::new(),
                    terminal: None,
                }),
                delivery: Mutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> HotSource<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 向全部当前订阅者交付一个数据单元。
    pub fn push(&self, item: T) -> crate::Result<()> {
        let _delivery = self.inner.delivery.lock();
        let observers = {
            let state = self.inner.state.lock();
            match &state.terminal {
                Some(Terminal::Failed(cause)) => {
                    return Err(FluxError::closed_with(Arc::clone(cause)));
                }
                Some(Terminal::Completed) => return Err(FluxError::closed()),
                None => state
                    .observers
                    .iter()
                    .map(|(_, observer)| Arc::clone(observer))
                    .collect::<Vec<_>>(),
            }
        };
        trace!(subscribers = observers.len(), "hot source delivering item");

        let mut first_error = None;
        for observer in observers {
            if let Err(err) = observer.on_next(item.clone())
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 以失败原因终止源。
    pub fn fail(&self, cause: FailureCause) -> bool {
        self.terminate(Terminal::Failed(cause))
    }

    /// 正常终止源。
    pub fn complete(&self) -> bool {
        self.terminate(Terminal::Completed)
    }

    /// 当前订阅者数量。
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }

    /// 是否已终止。
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminal.is_some()
    }

    fn terminate(&self, terminal: Terminal) -> bool {
        let _delivery = self.inner.delivery.lock();
        let observers = {
            let mut state = self.inner.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(terminal.clone());
            std::mem::take(&mut state.observers)
        };
        debug!(
            subscribers = observers.len(),
            failed = matches!(terminal, Terminal::Failed(_)),
            "hot source terminated"
        );
        for (_, observer) in observers {
            deliver_terminal(observer.as_ref(), &terminal);
        }
        true
    }
}

fn deliver_terminal<T>(observer: &dyn Observer<T>, terminal: &Terminal) {
    match terminal {
        Terminal::Failed(cause) => observer.on_failure(Arc::clone(cause)),
        Terminal::Completed => observer.on_complete(),
    }
}

impl<T> HotInner<T> {
    fn remove(&self, id: u64) {
        let mut state = self.state.lock();
        state.observers.retain(|(candidate, _)| *candidate != id);
    }
}

impl<T> PushSource<T> for HotSource<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> crate::Result<Subscription> {
        let mut state = self.inner.state.lock();
        if let Some(terminal) = state.terminal.clone() {
            drop(state);
            deliver_terminal(observer.as_ref(), &terminal);
            return Ok(Subscription::empty());
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        state.observers.push((id, observer));
        let weak: Weak<HotInner<T>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        }))
    }
}
