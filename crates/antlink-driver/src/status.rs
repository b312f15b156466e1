//! 驱动控制状态
//!
//! 控制线程与 run-loop 之间唯一的共享可变状态。使用原子操作代替锁保护的位掩码，
//! 只允许以下迁移：
//!
//! ```text
//! Idle --start--> Running <--pause/restart--> Paused
//!   \                 \                         /
//!    `----------------- stop ------------------' --> Stopped（终态）
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// 驱动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DriverState {
    /// 尚未启动（默认）
    #[default]
    Idle = 0,
    /// 运行中
    Running = 1,
    /// 运行中 + 暂停标志
    ///
    /// 暂停不会停止 run-loop 读取字节，遥测数据继续更新；
    /// 它只是提供给控制方自身逻辑的协作标志。
    Paused = 2,
    /// 已停止（终态，不可重新进入）
    Stopped = 3,
}

impl DriverState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Stopped。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 运行标志（Running 或 Paused）
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// 暂停标志
    pub fn is_paused(self) -> bool {
        self == Self::Paused
    }
}

/// 状态迁移失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// 已经启动过（包括已停止）
    AlreadyStarted,
    /// 已经处于暂停状态
    AlreadyPaused,
    /// 不在运行状态
    NotRunning,
    /// 不在暂停状态
    NotPaused,
}

/// 驱动状态（原子版本，用于线程间共享）
///
/// 每次读写只持有一个原子操作的时间，不涉及任何 I/O。
#[derive(Debug, Default)]
pub struct AtomicDriverState {
    inner: AtomicU8,
}

impl AtomicDriverState {
    pub fn new(state: DriverState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    /// 获取当前状态
    pub fn get(&self) -> DriverState {
        DriverState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 比较并交换
    ///
    /// 当前值等于 `current` 时设置为 `new` 并返回 Ok，否则返回实际值。
    fn transition(&self, current: DriverState, new: DriverState) -> Result<(), DriverState> {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(DriverState::from_u8)
    }

    /// Idle -> Running
    pub fn start(&self) -> Result<(), TransitionError> {
        self.transition(DriverState::Idle, DriverState::Running)
            .map_err(|_| TransitionError::AlreadyStarted)
    }

    /// Running -> Paused
    pub fn pause(&self) -> Result<(), TransitionError> {
        self.transition(DriverState::Running, DriverState::Paused)
            .map_err(|actual| match actual {
                DriverState::Paused => TransitionError::AlreadyPaused,
                _ => TransitionError::NotRunning,
            })
    }

    /// Paused -> Running
    pub fn restart(&self) -> Result<(), TransitionError> {
        self.transition(DriverState::Paused, DriverState::Running)
            .map_err(|_| TransitionError::NotPaused)
    }

    /// 任意状态 -> Stopped，返回之前的状态
    pub fn stop(&self) -> DriverState {
        DriverState::from_u8(self.inner.swap(DriverState::Stopped.as_u8(), Ordering::AcqRel))
    }
}
