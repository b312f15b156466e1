//! 调试录制（Debug Capture）
//!
//! 把每条接收到的原始消息按固定 13 字节记录追加写入二进制文件，
//! 用于离线分析与回放。
//!
//! # 设计
//!
//! - **Bounded Queue**: 钩子用 `try_send` 把记录送入有界通道，队列满时丢弃并计数
//! - **写线程**: 独立线程负责文件 I/O，run-loop 从不阻塞在磁盘上
//! - **关闭语义**: `close()` 之后不再接收新记录，已排队的记录仍会写完
//!
//! 记录格式：`SYNC | LEN | ID | DATA(9) | CHECKSUM`，未用字节为 0，
//! 校验和位于 `3 + LEN` 处（见 [`AntMessage::to_capture_record`]）。

use crate::hooks::FrameCallback;
use antlink_protocol::{AntMessage, MAX_MESSAGE_SIZE};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 单条录制记录
pub type CaptureRecord = [u8; MAX_MESSAGE_SIZE];

/// 队列容量（约 100 秒 @ 4 通道 × 4Hz × 多种消息）
const CAPTURE_QUEUE_CAPACITY: usize = 4096;

/// 写线程轮询关闭标志的间隔
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 录制钩子（在 run-loop 线程上运行）
pub struct CaptureHook {
    tx: Sender<CaptureRecord>,
    dropped_records: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl CaptureHook {
    /// 创建钩子和接收端
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<CaptureRecord>) {
        let (tx, rx) = bounded(capacity);
        let hook = Self {
            tx,
            dropped_records: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (hook, rx)
    }

    /// 丢弃计数器（队列满）
    #[must_use]
    pub fn dropped_records(&self) -> &Arc<AtomicU64> {
        &self.dropped_records
    }

    /// 停止接收新记录
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl FrameCallback for CaptureHook {
    #[inline]
    fn on_frame_received(&self, msg: &AntMessage) {
        if self.is_closed() {
            return;
        }
        if self.tx.try_send(msg.to_capture_record()).is_err() {
            self.dropped_records.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// 调试录制文件
///
/// 创建时以截断模式打开文件并启动写线程。Drop 时关闭并等待写线程结束。
///
/// # 示例
///
/// ```rust,no_run
/// use antlink_driver::capture::DebugCapture;
///
/// let capture = DebugCapture::create("antlog.bin").unwrap();
/// let hook = capture.hook();
/// // hooks.add_callback(hook) ...
/// capture.close();
/// ```
pub struct DebugCapture {
    path: PathBuf,
    hook: Arc<CaptureHook>,
    records_written: Arc<AtomicU64>,
    writer: Option<JoinHandle<io::Result<()>>>,
}

impl DebugCapture {
    /// 打开（截断）录制文件并启动写线程
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let (hook, rx) = CaptureHook::new(CAPTURE_QUEUE_CAPACITY);
        let hook = Arc::new(hook);
        let records_written = Arc::new(AtomicU64::new(0));

        let closed = hook.closed.clone();
        let written = records_written.clone();
        let writer = thread::Builder::new()
            .name("antlink-capture".into())
            .spawn(move || write_records(BufWriter::new(file), rx, &closed, &written))?;

        debug!("Debug capture opened at {}", path.display());
        Ok(Self {
            path,
            hook,
            records_written,
            writer: Some(writer),
        })
    }

    /// 获取钩子（注册到 `HookManager`）
    #[must_use]
    pub fn hook(&self) -> Arc<dyn FrameCallback> {
        self.hook.clone()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 停止接收新记录（可从任意线程调用，可重复调用）
    pub fn close(&self) {
        self.hook.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.hook.is_closed()
    }

    /// 已写入文件的记录数
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Acquire)
    }

    /// 因队列满被丢弃的记录数
    #[must_use]
    pub fn dropped_records(&self) -> u64 {
        self.hook.dropped_records().load(Ordering::Relaxed)
    }

    /// 关闭并等待写线程把剩余记录写完
    pub fn finish(mut self) -> io::Result<()> {
        self.close();
        self.join_writer()
    }

    fn join_writer(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("capture writer thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for DebugCapture {
    fn drop(&mut self) {
        self.close();
        if let Err(e) = self.join_writer() {
            error!("Debug capture {} failed: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for DebugCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugCapture")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .field("records_written", &self.records_written())
            .finish()
    }
}

fn write_records(
    mut out: impl Write,
    rx: Receiver<CaptureRecord>,
    closed: &AtomicBool,
    written: &AtomicU64,
) -> io::Result<()> {
    let write_one = |out: &mut dyn Write, record: &CaptureRecord| -> io::Result<()> {
        out.write_all(record)?;
        written.fetch_add(1, Ordering::AcqRel);
        Ok(())
    };

    loop {
        match rx.recv_timeout(WRITER_POLL_INTERVAL) {
            Ok(record) => write_one(&mut out, &record)?,
            Err(RecvTimeoutError::Timeout) => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // 关闭前已排队的记录
    for record in rx.try_iter() {
        write_one(&mut out, &record)?;
    }
    out.flush().inspect_err(|e| warn!("Failed to flush debug capture: {}", e))
}
