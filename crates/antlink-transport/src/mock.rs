//! Mock 后端
//!
//! 无硬件依赖的内存传输，用于测试：通过 `MockHandle` 注入接收字节、
//! 检查已写出的字节、模拟打开失败。

use crate::{Transport, TransportDeviceError, TransportDeviceErrorKind, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct Shared {
    rx: Mutex<VecDeque<u8>>,
    tx: Mutex<Vec<u8>>,
    fail_open: AtomicBool,
    is_open: AtomicBool,
    open_count: AtomicUsize,
    close_count: AtomicUsize,
}

/// Mock 传输
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// 测试侧句柄（可跨线程克隆）
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: shared.clone(),
            },
            MockHandle { shared },
        )
    }
}

impl MockHandle {
    /// 注入待接收的字节
    pub fn push_rx(&self, bytes: &[u8]) {
        self.shared.rx.lock().extend(bytes.iter().copied());
    }

    /// 剩余未读字节数
    pub fn pending_rx(&self) -> usize {
        self.shared.rx.lock().len()
    }

    /// 取出并清空已写出的字节
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.shared.tx.lock())
    }

    /// 已写出字节的副本
    pub fn written(&self) -> Vec<u8> {
        self.shared.tx.lock().clone()
    }

    /// 下次 `open` 返回错误
    pub fn fail_next_open(&self) {
        self.shared.fail_open.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open.load(Ordering::Acquire)
    }

    pub fn open_count(&self) -> usize {
        self.shared.open_count.load(Ordering::Acquire)
    }

    pub fn close_count(&self) -> usize {
        self.shared.close_count.load(Ordering::Acquire)
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.shared.open_count.fetch_add(1, Ordering::AcqRel);
        if self.shared.fail_open.swap(false, Ordering::AcqRel) {
            return Err(TransportError::Device(TransportDeviceError::new(
                TransportDeviceErrorKind::NotFound,
                "mock open failure",
            )));
        }
        self.shared.is_open.store(true, Ordering::Release);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.shared.is_open.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        let mut rx = self.shared.rx.lock();
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if !self.shared.is_open.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.shared.tx.lock().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.shared.is_open.swap(false, Ordering::AcqRel) {
            self.shared.close_count.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
