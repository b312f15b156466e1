//! 钩子系统（Hook System）
//!
//! 在 ANT 消息接收/发送时触发自定义回调。调试录制（`capture`）就是一个钩子。
//!
//! # 设计原则
//!
//! - **非阻塞**: 回调运行在 run-loop 线程上，必须使用 Channel 异步处理
//! - **职责分离**: HookManager 管理运行时回调，`PipelineConfig` 保持为纯数据
//!
//! # 使用示例
//!
//! ```rust
//! use antlink_driver::hooks::{FrameCallback, HookManager};
//! use antlink_protocol::{AntMessage, MessageId};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl FrameCallback for Counter {
//!     fn on_frame_received(&self, _msg: &AntMessage) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(Counter::default());
//! let mut hooks = HookManager::new();
//! hooks.add_callback(counter.clone());
//!
//! let msg = AntMessage::new(MessageId::BroadcastData, &[0; 9]).unwrap();
//! hooks.trigger_all(&msg);
//! assert_eq!(counter.0.load(Ordering::Relaxed), 1);
//! ```

use antlink_protocol::AntMessage;
use std::sync::Arc;

/// 消息回调 Trait
///
/// # 性能要求
///
/// - **非阻塞**: 禁止 I/O 和长时间持锁
/// - **Channel 模式**: 推荐使用 `crossbeam_channel::Sender::try_send`
pub trait FrameCallback: Send + Sync {
    /// 当解码出一条校验通过的消息时调用
    fn on_frame_received(&self, msg: &AntMessage);

    /// 当消息写入传输层成功后调用（可选）
    ///
    /// 默认为空操作。
    fn on_frame_sent(&self, msg: &AntMessage) {
        let _ = msg;
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的。构建完成后整体移交给 run-loop 线程，
/// 之后只在该线程上触发。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.push(callback);
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 触发所有接收回调（在 run-loop 中调用）
    pub fn trigger_all(&self, msg: &AntMessage) {
        for callback in self.callbacks.iter() {
            callback.on_frame_received(msg);
        }
    }

    /// 触发所有发送回调
    ///
    /// 仅在写入成功后调用，录制的是实际到达设备的消息。
    pub fn trigger_all_sent(&self, msg: &AntMessage) {
        for callback in self.callbacks.iter() {
            callback.on_frame_sent(msg);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager").field("callbacks", &self.callbacks.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antlink_protocol::MessageId;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TestCallback {
        received: Arc<AtomicU64>,
        sent: Arc<AtomicU64>,
    }

    impl FrameCallback for TestCallback {
        fn on_frame_received(&self, _msg: &AntMessage) {
            self.received.fetch_add(1, Ordering::Relaxed);
        }

        fn on_frame_sent(&self, _msg: &AntMessage) {
            self.sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sample() -> AntMessage {
        AntMessage::new(MessageId::BroadcastData, &[0, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap()
    }

    #[test]
    fn test_hook_manager_trigger_all() {
        let received = Arc::new(AtomicU64::new(0));
        let sent = Arc::new(AtomicU64::new(0));
        let mut hooks = HookManager::new();
        for _ in 0..2 {
            hooks.add_callback(Arc::new(TestCallback {
                received: received.clone(),
                sent: sent.clone(),
            }));
        }
        assert_eq!(hooks.len(), 2);

        hooks.trigger_all(&sample());
        assert_eq!(received.load(Ordering::Relaxed), 2);
        assert_eq!(sent.load(Ordering::Relaxed), 0);

        hooks.trigger_all_sent(&sample());
        assert_eq!(sent.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_hook_manager_clear() {
        let mut hooks = HookManager::new();
        hooks.add_callback(Arc::new(TestCallback {
            received: Arc::new(AtomicU64::new(0)),
            sent: Arc::new(AtomicU64::new(0)),
        }));
        assert!(!hooks.is_empty());
        hooks.clear();
        assert!(hooks.is_empty());
        // 空列表触发不应 panic
        hooks.trigger_all(&sample());
    }

    #[test]
    fn test_default_on_frame_sent_is_noop() {
        struct ReceiveOnly;
        impl FrameCallback for ReceiveOnly {
            fn on_frame_received(&self, _msg: &AntMessage) {}
        }

        let mut hooks = HookManager::new();
        hooks.add_callback(Arc::new(ReceiveOnly));
        hooks.trigger_all_sent(&sample());
    }
}
