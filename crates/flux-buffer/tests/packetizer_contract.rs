//! `packetizer_contract` 集成测试：验证定长重组器的切块、残余与订阅生命周期。
//!
//! # 测试目标（Why）
//! - 重组器只允许发出满块，残余字节必须留在累加器中等待后续数据或由持有者取走；
//! - 上游订阅随下游订阅者的出现与离开而建立、取消，终止事件必须转发。

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use bytes::Bytes;
use flux_buffer::{DataReceiver, Packetizer};
use flux_transport::{
    FailureCause, FluxError, HotSource, Observer, PushSource, Subscription, observer_fn,
};
use parking_lot::Mutex;

/// 记录全部回调的观察者。
#[derive(Default)]
struct Recorder {
    blocks: Mutex<Vec<Bytes>>,
    failure: Mutex<Option<String>>,
    completed: Mutex<bool>,
}

impl Observer<Bytes> for Recorder {
    fn on_next(&self, item: Bytes) -> flux_transport::Result<()> {
        self.blocks.lock().push(item);
        Ok(())
    }

    fn on_failure(&self, cause: FailureCause) {
        *self.failure.lock() = Some(cause.to_string());
    }

    fn on_complete(&self) {
        *self.completed.lock() = true;
    }
}

/// 首次订阅先停顿再以 `Interrupted` 失败的上游，之后的订阅委托给内存热源。
struct SlowFirstAttach {
    calls: AtomicUsize,
    inner: HotSource<Bytes>,
}

impl PushSource<Bytes> for SlowFirstAttach {
    fn subscribe(
        &self,
        observer: Arc<dyn Observer<Bytes>>,
    ) -> flux_transport::Result<Subscription> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(200));
            return Err(FluxError::Interrupted);
        }
        self.inner.subscribe(observer)
    }
}

fn push(source: &HotSource<Bytes>, block: &'static [u8]) {
    source.push(Bytes::from_static(block)).expect("推送失败");
}

/// 验证 `[3, 5, 2]` 字节的推送在块大小 4 下产出两个满块并保留 2 字节。
#[test]
fn rechunks_pushes_into_full_blocks_and_retains_remainder() {
    let source = HotSource::<Bytes>::new();
    let packetizer = Packetizer::new(source.clone(), 4).expect("构造失败");
    let recorder = Arc::new(Recorder::default());
    let _subscription = packetizer.subscribe(recorder.clone()).expect("订阅失败");

    push(&source, &[1, 2, 3]);
    assert!(recorder.blocks.lock().is_empty(), "不得发出半块");
    push(&source, &[4, 5, 6, 7, 8]);
    push(&source, &[9, 10]);

    let blocks = recorder.blocks.lock().clone();
    assert_eq!(blocks, vec![&[1u8, 2, 3, 4][..], &[5u8, 6, 7, 8][..]]);
    assert_eq!(packetizer.retained(), 2);
    assert_eq!(packetizer.take_partial().as_deref(), Some(&[9u8, 10][..]));
    assert_eq!(packetizer.retained(), 0);
    assert_eq!(packetizer.take_partial(), None);
}

/// 验证大块推送一次产出多个满块。
#[test]
fn large_push_emits_several_blocks() {
    let source = HotSource::<Bytes>::new();
    let packetizer = source.clone().open_packetized(3).expect("构造失败");
    assert_eq!(packetizer.block_size(), 3);
    let recorder = Arc::new(Recorder::default());
    let _subscription = packetizer.subscribe(recorder.clone()).expect("订阅失败");

    push(&source, b"abcdefgh");
    let blocks = recorder.blocks.lock().clone();
    assert_eq!(blocks, vec![&b"abc"[..], &b"def"[..]]);
    assert_eq!(packetizer.retained(), 2);
}

/// 验证上游订阅惰性建立，并在最后一个下游离开时取消。
#[test]
fn upstream_subscription_follows_downstream_subscribers() {
    let source = HotSource::<Bytes>::new();
    let packetizer = Packetizer::new(source.clone(), 2).expect("构造失败");
    assert_eq!(source.subscriber_count(), 0, "无下游时不得订阅上游");

    let first = packetizer.subscribe(observer_fn(|_: Bytes| Ok(()))).expect("订阅失败");
    let second = packetizer.subscribe(observer_fn(|_: Bytes| Ok(()))).expect("订阅失败");
    assert_eq!(source.subscriber_count(), 1, "多个下游共享一个上游订阅");
    assert_eq!(packetizer.subscriber_count(), 2);

    drop(first);
    assert_eq!(source.subscriber_count(), 1);
    drop(second);
    assert_eq!(source.subscriber_count(), 0, "最后一个下游离开必须取消上游订阅");
    assert!(!packetizer.is_upstream_active());

    let _again = packetizer.subscribe(observer_fn(|_: Bytes| Ok(()))).expect("重新订阅失败");
    assert_eq!(source.subscriber_count(), 1);
}

/// 验证上游失败转发给全部下游，并结束上游订阅。
#[test]
fn upstream_failure_is_forwarded() {
    let source = HotSource::<Bytes>::new();
    let packetizer = Packetizer::new(source.clone(), 2).expect("构造失败");
    let recorder = Arc::new(Recorder::default());
    let _subscription = packetizer.subscribe(recorder.clone()).expect("订阅失败");

    source.fail(FluxError::cause(FluxError::Interrupted));
    assert_eq!(
        recorder.failure.lock().as_deref(),
        Some("wait was interrupted")
    );
    assert_eq!(packetizer.subscriber_count(), 0);
    assert!(!packetizer.is_upstream_active());
}

/// 验证上游完成同样转发。
#[test]
fn upstream_completion_is_forwarded() {
    let source = HotSource::<Bytes>::new();
    let packetizer = Packetizer::new(source.clone(), 2).expect("构造失败");
    let recorder = Arc::new(Recorder::default());
    let _subscription = packetizer.subscribe(recorder.clone()).expect("订阅失败");

    assert!(source.complete());
    assert!(*recorder.completed.lock());
    assert!(recorder.failure.lock().is_none());
}

/// 验证重组器接在字节缓冲前面：缓冲只看到满块。
#[test]
fn packetizer_feeds_a_data_buffer() {
    let source = HotSource::<Bytes>::new();
    let packetizer = source.clone().open_packetized(4).expect("构造失败");
    let buffer = packetizer.open_data_buffer(8).expect("打开缓冲失败");

    push(&source, b"abc");
    assert_eq!(buffer.available_bytes(), 0);
    push(&source, b"def");
    assert_eq!(buffer.available_bytes(), 4);

    let mut frame = [0u8; 4];
    buffer
        .read_data_timeout(&mut frame, Duration::from_secs(1))
        .expect("读取满块失败");
    assert_eq!(&frame, b"abcd");
    assert_eq!(packetizer.retained(), 2);
    assert_eq!(packetizer.take_partial().as_deref(), Some(&b"ef"[..]));
}

/// 验证首次上游订阅失败时，建立期间加入的订阅者收到失败事件而不是被悬空。
#[test]
fn failed_attach_fails_subscribers_that_joined_meanwhile() {
    let hot = HotSource::<Bytes>::new();
    let upstream = Arc::new(SlowFirstAttach {
        calls: AtomicUsize::new(0),
        inner: hot.clone(),
    });
    let packetizer = Packetizer::new(Arc::clone(&upstream), 2).expect("构造失败");

    let first = {
        let packetizer = packetizer.clone();
        thread::spawn(move || packetizer.subscribe(observer_fn(|_: Bytes| Ok(()))))
    };
    thread::sleep(Duration::from_millis(50));
    let latecomer = Arc::new(Recorder::default());
    let _late = packetizer
        .subscribe(latecomer.clone())
        .expect("建立期间加入的订阅应立即返回");

    let error = first
        .join()
        .expect("订阅线程异常退出")
        .err()
        .expect("首次上游订阅必须失败");
    assert!(matches!(error, FluxError::Interrupted));
    assert_eq!(
        latecomer.failure.lock().as_deref(),
        Some("wait was interrupted")
    );
    assert_eq!(packetizer.subscriber_count(), 0);
    assert!(!packetizer.is_upstream_active());

    let fresh = Arc::new(Recorder::default());
    let _fresh = packetizer.subscribe(fresh.clone()).expect("重新订阅失败");
    assert!(packetizer.is_upstream_active());
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    push(&hot, b"xy");
    assert_eq!(*fresh.blocks.lock(), vec![&b"xy"[..]]);
    assert!(latecomer.blocks.lock().is_empty());
}
