use std::{io, sync::Arc, time::Duration};

use bytes::Bytes;
use flux_transport::{DataSender, FailureCause, FluxError, PushSource};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{BufferConfig, DataBuffer};

/// 把字节通道（或其任一半部）桥接为阻塞式 `std::io::Read` / `std::io::Write`。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 现有协议代码大量基于 `Read`/`Write` 编写（`read_exact`、`BufReader`、`write_all`），
///   适配器让它们无需修改即可运行在推送式传输之上；
/// - 协议通常假定“应答在 T 内到达”，因此读取带有统一的超时。
///
/// ## 逻辑 (How)
/// - 首次 `read` 时才打开内部持有的 [`DataBuffer`]，此前到达的字节按热源语义丢弃；
/// - `read`：至多等待 `read_timeout` 取得第一个字节，随后非阻塞地读出其余可用字节；
/// - 读取超时之外的任一错误都会关闭适配器（连同内部缓冲），后续调用快速失败并返回关闭错误。
///
/// ## 契约 (What)
/// - `read` 返回 `Ok(n)`，`1 <= n <= buf.len()`；空目标切片只完成缓冲的惰性打开并返回 `Ok(0)`；
/// - 超时以 `io::ErrorKind::TimedOut` 呈现，关闭以 `io::ErrorKind::BrokenPipe` 呈现；
/// - `flush` 在打开状态下为空操作。
///
/// ## 注意事项 (Trade-offs)
/// - 读取超时不关闭适配器，也不消费任何字节，调用方可以直接重试；其余读写错误立即关闭适配器。
pub struct ByteChannelAdapter<C> {
    channel: C,
    capacity: usize,
    read_timeout: Duration,
    state: Mutex<AdapterState>,
}

#[derive(Default)]
struct AdapterState {
    buffer: Option<Arc<DataBuffer>>,
    closed: bool,
    cause: Option<FailureCause>,
}

impl<C> ByteChannelAdapter<C> {
    /// `capacity` 为内部缓冲容量，`read_timeout` 为等待首字节的上限。
    pub fn new(channel: C, capacity: usize, read_timeout: Duration) -> Self {
        Self {
            channel,
            capacity,
            read_timeout,
            state: Mutex::new(AdapterState::default()),
        }
    }

    /// 以配置中的 `data_capacity` 与 `read_timeout_ms` 构造。
    pub fn with_config(channel: C, config: &BufferConfig) -> Self {
        Self::new(channel, config.data_capacity, config.read_timeout())
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn is_open(&self) -> bool {
        !self.state.lock().closed
    }

    /// 关闭适配器与内部缓冲；幂等。
    pub fn close(&self) -> Result<(), FluxError> {
        self.shut(None);
        Ok(())
    }

    fn shut(&self, cause: Option<FailureCause>) {
        let buffer = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.cause = cause;
            state.buffer.take()
        };
        if let Some(buffer) = buffer {
            // 缓冲关闭时会取消订阅，须在适配器锁外进行。
            let _ = buffer.close();
        }
        debug!("byte channel adapter closed");
    }

    fn closed_error(&self) -> FluxError {
        FluxError::Closed {
            cause: self.state.lock().cause.clone(),
        }
    }

    /// 记录失败并关闭，原样返回错误。
    fn fail(&self, err: FluxError) -> FluxError {
        warn!(code = err.code(), error = %err, "byte channel adapter failed, closing");
        let cause = match &err {
            FluxError::Closed { cause } => cause.clone(),
            other => Some(FluxError::cause(other.clone())),
        };
        self.shut(cause);
        err
    }
}

impl<C> ByteChannelAdapter<C>
where
    C: PushSource<Bytes>,
{
    fn buffer(&self) -> Result<Arc<DataBuffer>, FluxError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FluxError::Closed {
                cause: state.cause.clone(),
            });
        }
        if let Some(buffer) = &state.buffer {
            return Ok(Arc::clone(buffer));
        }
        let buffer = Arc::new(DataBuffer::open(&self.channel, self.capacity)?);
        state.buffer = Some(Arc::clone(&buffer));
        debug!(
            capacity = self.capacity,
            read_timeout = ?self.read_timeout,
            "byte channel adapter opened buffer"
        );
        Ok(buffer)
    }

    /// 等待首字节，再读出其余已缓冲字节。
    pub fn read_bytes(&self, dest: &mut [u8]) -> Result<usize, FluxError> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        let buffer = self.buffer().map_err(|err| self.fail(err))?;
        if dest.is_empty() {
            return Ok(0);
        }
        let result = buffer
            .read_data_timeout(&mut dest[..1], self.read_timeout)
            .and_then(|()| buffer.read_data(&mut dest[1..]));
        match result {
            Ok(rest) => {
                trace!(count = rest + 1, "byte channel adapter read");
                Ok(rest + 1)
            }
            Err(err @ FluxError::Timeout { .. }) => {
                debug!(error = %err, "byte channel adapter read timed out");
                Err(err)
            }
            Err(err) => Err(self.fail(err)),
        }
    }
}

impl<C> ByteChannelAdapter<C>
where
    C: DataSender,
{
    /// 把整个切片交给发送端。
    pub fn write_bytes(&self, block: &[u8]) -> Result<usize, FluxError> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        match self.channel.send_data(block) {
            Ok(written) => {
                trace!(written, "byte channel adapter write");
                Ok(written)
            }
            Err(err) => Err(self.fail(err)),
        }
    }
}

impl<C> Drop for ByteChannelAdapter<C> {
    fn drop(&mut self) {
        self.shut(None);
    }
}

impl<C> io::Read for &ByteChannelAdapter<C>
where
    C: PushSource<Bytes>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(io::Error::from)
    }
}

impl<C> io::Read for ByteChannelAdapter<C>
where
    C: PushSource<Bytes>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(io::Error::from)
    }
}

impl<C> io::Write for &ByteChannelAdapter<C>
where
    C: DataSender,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(self.closed_error().into())
        }
    }
}

impl<C> io::Write for ByteChannelAdapter<C>
where
    C: DataSender,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}
