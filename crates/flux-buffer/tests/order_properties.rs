//! 字节顺序与重组性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：推送侧的分块边界与读取侧的切分方式都是任意的，唯一不变的是字节顺序；
//!   以随机分块 + 随机读取长度驱动真实的 `DataBuffer` 与 `Packetizer`，验证“读出的字节串恰好等于推入的字节串”。
//! - **设计手法 (How)**：单线程交替执行“推送一块 / 按随机长度尽量读取”，推送块不超过剩余空间，
//!   因此不会触发溢出路径；重组性质额外验证每个发出的块长度恰为块大小。
//! - **合同与边界 (What)**：
//!   - 输入：`1..=16` 字节的随机块序列与 `1..=8` 的读取长度序列；
//!   - 断言：读出序列是推入序列的前缀，排空后二者相等；重组器发出的拼接加残余等于输入。

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use flux_buffer::{DataBuffer, Packetizer};
use flux_transport::{HotSource, PushSource, observer_fn};
use parking_lot::Mutex;
use proptest::prelude::*;

const CAPACITY: usize = 32;

fn blocks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..=16), 1..24)
}

fn read_lengths() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=8, 1..16)
}

proptest! {
    #[test]
    fn prop_bytes_are_read_in_push_order(blocks in blocks(), lengths in read_lengths()) {
        let source = HotSource::<Bytes>::new();
        let buffer = DataBuffer::open(&source, CAPACITY).expect("打开缓冲失败");
        let expected: Vec<u8> = blocks.iter().flatten().copied().collect();
        let mut received = Vec::with_capacity(expected.len());
        let mut cursor = lengths.iter().cycle();

        for block in &blocks {
            while CAPACITY - buffer.available_bytes() < block.len() {
                let want = cursor.next().copied().unwrap_or(1).min(buffer.available_bytes());
                let mut dest = vec![0u8; want];
                buffer
                    .read_data_timeout(&mut dest, Duration::from_secs(1))
                    .expect("腾出空间失败");
                received.extend_from_slice(&dest);
            }
            source.push(Bytes::copy_from_slice(block)).expect("推送失败");
        }
        let mut rest = vec![0u8; buffer.available_bytes()];
        prop_assert_eq!(buffer.read_data(&mut rest).expect("排空失败"), rest.len());
        received.extend_from_slice(&rest);

        prop_assert_eq!(received, expected);
    }

    #[test]
    fn prop_packetizer_emits_only_full_blocks(blocks in blocks(), block_size in 1usize..=8) {
        let source = HotSource::<Bytes>::new();
        let packetizer = Packetizer::new(source.clone(), block_size).expect("构造失败");
        let emitted = Arc::new(Mutex::new(Vec::<Bytes>::new()));
        let sink = Arc::clone(&emitted);
        let _subscription = packetizer
            .subscribe(observer_fn(move |block: Bytes| {
                sink.lock().push(block);
                Ok(())
            }))
            .expect("订阅失败");

        for block in &blocks {
            source.push(Bytes::copy_from_slice(block)).expect("推送失败");
        }

        let emitted = emitted.lock().clone();
        prop_assert!(emitted.iter().all(|block| block.len() == block_size));
        let mut rebuilt: Vec<u8> = emitted.iter().flat_map(|block| block.iter().copied()).collect();
        prop_assert!(packetizer.retained() < block_size);
        if let Some(partial) = packetizer.take_partial() {
            rebuilt.extend_from_slice(&partial);
        }
        let expected: Vec<u8> = blocks.iter().flatten().copied().collect();
        prop_assert_eq!(rebuilt, expected);
    }
}
