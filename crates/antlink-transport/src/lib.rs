//! # ANT Link Transport Layer
//!
//! 字节传输抽象层：一个字节流进，一个字节流出。
//!
//! 帧解析和消息分发不关心当前使用的是哪个后端，后端在构造时一次性选定。

use std::fmt;
use thiserror::Error;

#[cfg(unix)]
pub mod serial;

#[cfg(feature = "usb")]
pub mod usb;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(unix)]
pub use serial::SerialTransport;

#[cfg(feature = "usb")]
pub use usb::UsbTransport;

#[cfg(feature = "mock")]
pub use mock::{MockHandle, MockTransport};

/// 默认串口波特率
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] TransportDeviceError),
    #[error("Transport not open")]
    NotOpen,
    #[error("Operation timeout")]
    Timeout,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct TransportDeviceError {
    pub kind: TransportDeviceErrorKind,
    pub message: String,
}

impl TransportDeviceError {
    pub fn new(kind: TransportDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            TransportDeviceErrorKind::NotFound | TransportDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for TransportDeviceError {
    fn from(message: String) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for TransportDeviceError {
    fn from(message: &str) -> Self {
        Self::new(TransportDeviceErrorKind::Unknown, message)
    }
}

/// 字节传输接口
///
/// # 约定
///
/// - `read` 非阻塞：没有可读字节时返回 `Ok(0)`
/// - `write` 返回实际写出的字节数
/// - `close` 可重复调用
pub trait Transport: Send {
    fn open(&mut self) -> Result<(), TransportError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;

    /// 后端描述（用于日志）
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        (**self).write(bytes)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 后端选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TransportKind {
    /// 自动探测（默认）：有 USB 棒时使用 USB，否则使用串口
    #[default]
    Auto,
    /// 强制使用 USB Bulk
    Usb,
    /// 强制使用串口
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Usb => write!(f, "usb"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = TransportDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "usb" => Ok(Self::Usb),
            "serial" => Ok(Self::Serial),
            other => Err(TransportDeviceError::new(
                TransportDeviceErrorKind::UnsupportedConfig,
                format!("unknown transport kind: {}", other),
            )),
        }
    }
}

/// 按选择构造后端（尚未打开）
///
/// `Auto` 在构造时探测一次 USB 设备，之后不再切换。
pub fn open_transport(
    kind: TransportKind,
    port: &str,
    baud_rate: u32,
) -> Result<Box<dyn Transport>, TransportError> {
    match kind {
        TransportKind::Usb => usb_backend(),
        TransportKind::Serial => serial_backend(port, baud_rate),
        TransportKind::Auto => {
            if usb_present() {
                tracing::debug!("ANT USB stick detected, using USB backend");
                usb_backend()
            } else {
                tracing::debug!("No ANT USB stick found, using serial port {}", port);
                serial_backend(port, baud_rate)
            }
        },
    }
}

#[cfg(feature = "usb")]
fn usb_present() -> bool {
    UsbTransport::is_present()
}

#[cfg(not(feature = "usb"))]
fn usb_present() -> bool {
    false
}

#[cfg(feature = "usb")]
fn usb_backend() -> Result<Box<dyn Transport>, TransportError> {
    Ok(Box::new(UsbTransport::new()))
}

#[cfg(not(feature = "usb"))]
fn usb_backend() -> Result<Box<dyn Transport>, TransportError> {
    Err(TransportError::Device(TransportDeviceError::new(
        TransportDeviceErrorKind::UnsupportedConfig,
        "USB backend not compiled in (enable the `usb` feature)",
    )))
}

#[cfg(unix)]
fn serial_backend(port: &str, baud_rate: u32) -> Result<Box<dyn Transport>, TransportError> {
    Ok(Box::new(SerialTransport::new(port, baud_rate)))
}

#[cfg(not(unix))]
fn serial_backend(_port: &str, _baud_rate: u32) -> Result<Box<dyn Transport>, TransportError> {
    Err(TransportError::Device(TransportDeviceError::new(
        TransportDeviceErrorKind::UnsupportedConfig,
        "serial backend is only available on unix platforms",
    )))
}
