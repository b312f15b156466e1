//! 驱动层错误类型定义

use crate::config::ConfigError;
use crate::status::TransitionError;
use antlink_protocol::ProtocolError;
use antlink_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误（打开失败会终止 run-loop）
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 已经启动过（驱动不可重复启动）
    #[error("Driver already started")]
    AlreadyStarted,

    /// 未在运行
    #[error("Driver not running")]
    NotRunning,

    /// 已经暂停
    #[error("Driver already paused")]
    AlreadyPaused,

    /// 未暂停
    #[error("Driver not paused")]
    NotPaused,

    /// run-loop 线程错误
    #[error("Run-loop thread error: {0}")]
    RunThread(String),
}

impl From<TransitionError> for DriverError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::AlreadyStarted => Self::AlreadyStarted,
            TransitionError::AlreadyPaused => Self::AlreadyPaused,
            TransitionError::NotRunning => Self::NotRunning,
            TransitionError::NotPaused => Self::NotPaused,
        }
    }
}
