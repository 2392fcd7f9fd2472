use std::{fmt, sync::Arc};

use crate::{FailureCause, FluxError};

/// 推送源的回调接收者。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输在自己的执行上下文（I/O 线程、回调线程）中交付数据，消费者无法反压；
///   观察者是推送源与缓冲适配器之间唯一的接缝。
///
/// ## 契约说明（What）
/// - `on_next`：交付一个数据单元；返回错误表示观察者已无法接收（例如缓冲溢出），
///   推送源应将该错误回报给其调用者，但不得因此重排后续数据；
/// - `on_failure`：终止事件，至多一次，其后不再有任何回调；
/// - `on_complete`：正常结束的终止事件，与 `on_failure` 互斥；默认实现为空。
///
/// ## 风险提示（Trade-offs）
/// - 回调可能在任意线程上执行，实现必须 `Send + Sync`；
/// - `on_next` 允许阻塞（例如等待读取者排空），但会同步阻塞推送源的投递线程。
pub trait Observer<T>: Send + Sync {
    /// 接收一个数据单元。
    fn on_next(&self, item: T) -> crate::Result<()>;

    /// 接收上游失败通知。
    fn on_failure(&self, cause: FailureCause);

    /// 接收上游正常结束通知。
    fn on_complete(&self) {}
}

/// 推送式数据源。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为串口、套接字、仿真链路等“只能推、不能拉”的传输提供统一订阅接口；
/// - 订阅句柄 [`Subscription`] 决定回调的生命周期，取消后不再交付数据。
///
/// ## 契约说明（What）
/// - `subscribe` 成功后开始向 `observer` 交付数据；若源已终止，可在返回前同步交付终止事件；
/// - 每个订阅至多收到一个终止事件，之后不再有数据回调；
/// - 同一订阅上的 `on_next` 调用按源产生的顺序串行发生。
pub trait PushSource<T>: Send + Sync {
    /// 注册观察者，返回可取消的订阅句柄。
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> crate::Result<Subscription>;
}

impl<T, S> PushSource<T> for Arc<S>
where
    S: PushSource<T> + ?Sized,
{
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> crate::Result<Subscription> {
        (**self).subscribe(observer)
    }
}

impl<T, S> PushSource<T> for &S
where
    S: PushSource<T> + ?Sized,
{
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> crate::Result<Subscription> {
        (**self).subscribe(observer)
    }
}

/// 订阅的生命周期守卫，负责在取消或 `Drop` 时解除注册。
///
/// # 契约（What）
/// - `cancel` 幂等：第一次调用执行解除逻辑，其后均为空操作；
/// - `Drop` 等价于 `cancel`，因此持有者丢弃句柄即意味着退订。
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    /// 以解除注册的回调构造订阅句柄。
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// 无需解除注册的空订阅，例如订阅时源已终止。
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// 取消订阅。
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// 是否仍持有未执行的解除回调。
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// 以闭包实现的观察者，忽略终止事件。
struct FnObserver<F> {
    on_next: F,
}

impl<T, F> Observer<T> for FnObserver<F>
where
    F: Fn(T) -> crate::Result<()> + Send + Sync,
{
    fn on_next(&self, item: T) -> crate::Result<()> {
        (self.on_next)(item)
    }

    fn on_failure(&self, _cause: FailureCause) {}
}

/// 以闭包快速构造观察者，常用于测试与诊断转储。
pub fn observer_fn<T, F>(on_next: F) -> Arc<dyn Observer<T>>
where
    T: 'static,
    F: Fn(T) -> Result<(), FluxError> + Send + Sync + 'static,
{
    Arc::new(FnObserver { on_next })
}
