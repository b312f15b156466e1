//! 驱动配置
//!
//! TOML 配置文件（serde）以及设备配对列表的解析。
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! transport = "auto"          # auto | usb | serial
//! baud = 115200
//! devices = "12p, 45h"        # <设备号><类型后缀>，逗号分隔；为空时自动配对
//! debug_capture = "antlog.bin"
//! event_queue_capacity = 64
//! ```

use antlink_protocol::sensor::{self, ChannelType};
use antlink_transport::{DEFAULT_BAUD_RATE, TransportKind};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// 默认串口设备
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// 默认调试录制文件
pub const DEFAULT_CAPTURE_FILE: &str = "antlog.bin";

/// 默认事件队列容量
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unknown device type suffix '{suffix}' in entry \"{entry}\"")]
    UnknownSuffix { entry: String, suffix: char },

    #[error("Invalid device number in entry \"{entry}\"")]
    InvalidDeviceNumber { entry: String },

    #[error("Event queue capacity must be at least 1")]
    ZeroEventQueue,
}

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// 串口设备路径（USB 后端忽略）
    pub port: String,
    /// 后端选择
    pub transport: TransportKind,
    /// 串口波特率
    pub baud: u32,
    /// 配对列表，如 `"12p,45h"`
    pub devices: String,
    /// 调试录制文件，`None` 表示不录制
    pub debug_capture: Option<PathBuf>,
    /// 控制方事件队列容量
    pub event_queue_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            transport: TransportKind::Auto,
            baud: DEFAULT_BAUD_RATE,
            devices: String::new(),
            debug_capture: Some(PathBuf::from(DEFAULT_CAPTURE_FILE)),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
        }
    }
}

impl DriverConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 校验配置（包括配对列表）
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::ZeroEventQueue);
        }
        self.device_specs().map(|_| ())
    }

    /// 解析配对列表
    pub fn device_specs(&self) -> Result<Vec<DeviceSpec>, ConfigError> {
        parse_device_profile(&self.devices)
    }
}

/// 单个配对项：设备号（0 为通配）+ 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    pub device_number: u16,
    pub channel_type: ChannelType,
}

impl FromStr for DeviceSpec {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let entry = entry.trim();
        let mut chars = entry.chars();
        let suffix = chars.next_back().ok_or_else(|| ConfigError::InvalidDeviceNumber {
            entry: entry.to_string(),
        })?;
        let number = chars.as_str();

        let channel_type = sensor::lookup_by_suffix(suffix)
            .filter(|t| !t.is_unused())
            .ok_or_else(|| ConfigError::UnknownSuffix {
                entry: entry.to_string(),
                suffix,
            })?;

        // 只有后缀时按通配处理
        let device_number = if number.is_empty() {
            0
        } else {
            number.parse().map_err(|_| ConfigError::InvalidDeviceNumber {
                entry: entry.to_string(),
            })?
        };

        Ok(Self {
            device_number,
            channel_type,
        })
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.device_number,
            sensor::suffix_for(self.channel_type)
        )
    }
}

/// 解析逗号分隔的配对列表（空白去除，空项跳过）
pub fn parse_device_profile(profile: &str) -> Result<Vec<DeviceSpec>, ConfigError> {
    profile
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect()
}
