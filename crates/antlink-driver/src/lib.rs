//! 驱动层模块
//!
//! ANT+ USB 棒 / 串口适配器的设备驱动，包括：
//! - run-loop 线程（独占传输层与全部通道状态）
//! - 通道池：设备配对、错峰搜索、复合功率计控制通道关联
//! - 状态同步（ArcSwap 无锁读取遥测快照）
//! - 钩子系统：调试录制、自定义回调
//!
//! # 使用示例
//!
//! ```no_run
//! use antlink_driver::{AntBuilder, DriverEvent, RealtimeData};
//! use std::time::Duration;
//!
//! let mut driver = AntBuilder::new().device_profile("12p,45h").unwrap().build().unwrap();
//! driver.start().unwrap();
//!
//! let mut rt = RealtimeData::default();
//! while let Ok(event) = driver.events().recv_timeout(Duration::from_secs(30)) {
//!     if let DriverEvent::DeviceFound { channel, device_number, .. } = event {
//!         println!("channel {channel}: device {device_number}");
//!     }
//!     driver.get_realtime_data(&mut rt);
//! }
//! driver.stop();
//! ```

mod builder;
pub mod capture;
pub mod channel;
pub mod config;
mod driver;
mod error;
pub mod hooks;
pub mod pipeline;
pub mod pool;
pub mod state;
pub mod status;
pub mod telemetry;

pub use builder::AntBuilder;
pub use capture::DebugCapture;
pub use channel::{Channel, ChannelEvent, ChannelIndex, MessageSink};
pub use config::{ConfigError, DeviceSpec, DriverConfig, parse_device_profile};
pub use driver::AntDriver;
pub use error::DriverError;
pub use hooks::{FrameCallback, HookManager};
pub use pipeline::{DEFAULT_PAIRING, PipelineConfig, RunLoop};
pub use pool::ChannelPool;
pub use state::{DriverContext, DriverEvent};
pub use status::{AtomicDriverState, DriverState};
pub use telemetry::{RealtimeData, Reading};
