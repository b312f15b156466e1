//! 共享状态
//!
//! 控制方与 run-loop 之间共享的全部状态：控制状态、遥测快照和事件队列。
//! 通道状态只属于 run-loop 线程，不在这里。

use crate::status::AtomicDriverState;
use crate::telemetry::RealtimeData;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// 上报给控制方的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// 发现设备
    DeviceFound {
        channel: u8,
        device_number: u16,
        /// 传感器上报的设备类型码
        device_type: u8,
    },
    /// 设备丢失
    DeviceLost { channel: u8 },
    /// 快速搜索超时
    SearchTimeout { channel: u8 },
}

/// 驱动上下文
pub struct DriverContext {
    /// 控制状态
    pub status: AtomicDriverState,
    /// 遥测快照（run-loop 唯一写者）
    pub telemetry: ArcSwap<RealtimeData>,
    events: Sender<DriverEvent>,
    dropped_events: AtomicU64,
}

impl DriverContext {
    /// 创建上下文和事件接收端
    pub fn new(event_capacity: usize) -> (Self, Receiver<DriverEvent>) {
        let (events, rx) = bounded(event_capacity.max(1));
        let ctx = Self {
            status: AtomicDriverState::default(),
            telemetry: ArcSwap::from_pointee(RealtimeData::default()),
            events,
            dropped_events: AtomicU64::new(0),
        };
        (ctx, rx)
    }

    /// 上报事件（非阻塞，队列满或无人接收时丢弃并计数）
    pub fn emit(&self, event: DriverEvent) {
        match self.events.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event) | TrySendError::Disconnected(event)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                trace!("Dropping driver event {:?}", event);
            },
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// 发布遥测快照
    pub fn publish(&self, data: RealtimeData) {
        self.telemetry.store(Arc::new(data));
    }

    /// 当前遥测快照
    pub fn snapshot(&self) -> RealtimeData {
        **self.telemetry.load()
    }
}

impl std::fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverContext")
            .field("status", &self.status.get())
            .field("dropped_events", &self.dropped_events())
            .finish()
    }
}
