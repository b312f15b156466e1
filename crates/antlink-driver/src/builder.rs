//! Builder 模式实现
//!
//! 提供链式构造 `AntDriver` 实例的便捷方式。

use crate::config::{DEFAULT_EVENT_QUEUE_CAPACITY, DeviceSpec, DriverConfig, parse_device_profile};
use crate::driver::AntDriver;
use crate::error::DriverError;
use crate::hooks::FrameCallback;
use crate::pipeline::{PipelineConfig, RunLoop};
use crate::state::DriverContext;
use antlink_transport::{DEFAULT_BAUD_RATE, Transport, TransportKind, open_transport};
use std::path::PathBuf;
use std::sync::Arc;

/// AntDriver Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use antlink_driver::AntBuilder;
/// use antlink_transport::TransportKind;
///
/// let mut driver = AntBuilder::new()
///     .transport(TransportKind::Serial)
///     .port("/dev/ttyUSB0")
///     .device_profile("12p,45h")
///     .unwrap()
///     .build()
///     .unwrap();
/// driver.start().unwrap();
/// ```
pub struct AntBuilder {
    port: String,
    baud_rate: u32,
    transport_kind: TransportKind,
    devices: Vec<DeviceSpec>,
    debug_capture: Option<PathBuf>,
    event_queue_capacity: usize,
    pipeline_config: PipelineConfig,
    hooks: Vec<Arc<dyn FrameCallback>>,
}

impl Default for AntBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AntBuilder {
    /// 默认不录制调试文件
    pub fn new() -> Self {
        Self {
            port: crate::config::DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            transport_kind: TransportKind::Auto,
            devices: Vec::new(),
            debug_capture: None,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            pipeline_config: PipelineConfig::default(),
            hooks: Vec::new(),
        }
    }

    /// 从配置文件内容构造
    pub fn from_config(config: &DriverConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            port: config.port.clone(),
            baud_rate: config.baud,
            transport_kind: config.transport,
            devices: config.device_specs()?,
            debug_capture: config.debug_capture.clone(),
            event_queue_capacity: config.event_queue_capacity,
            pipeline_config: PipelineConfig::default(),
            hooks: Vec::new(),
        })
    }

    /// 串口设备路径
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// 串口波特率（默认 115200）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// 后端选择（默认 Auto）
    pub fn transport(mut self, kind: TransportKind) -> Self {
        self.transport_kind = kind;
        self
    }

    /// 追加一个配对项
    pub fn device(mut self, spec: DeviceSpec) -> Self {
        self.devices.push(spec);
        self
    }

    /// 用配对列表字符串（如 `"12p,45h"`）替换配对项
    pub fn device_profile(mut self, profile: &str) -> Result<Self, DriverError> {
        self.devices = parse_device_profile(profile)?;
        Ok(self)
    }

    /// 调试录制文件（`None` 表示不录制）
    pub fn debug_capture(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.debug_capture = path.map(Into::into);
        self
    }

    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    /// 注册消息钩子
    pub fn hook(mut self, callback: Arc<dyn FrameCallback>) -> Self {
        self.hooks.push(callback);
        self
    }

    /// 按后端选择构造传输层并创建驱动（尚未启动）
    pub fn build(self) -> Result<AntDriver, DriverError> {
        let transport = open_transport(self.transport_kind, &self.port, self.baud_rate)?;
        Ok(self.build_with_transport(transport))
    }

    /// 使用自定义传输层创建驱动（尚未启动）
    pub fn build_with_transport(self, transport: impl Transport + 'static) -> AntDriver {
        let (ctx, events) = DriverContext::new(self.event_queue_capacity);
        let ctx = Arc::new(ctx);

        let transport: Box<dyn Transport> = Box::new(transport);
        let mut run_loop = RunLoop::new(transport, self.devices, ctx.clone(), self.pipeline_config);
        for hook in self.hooks {
            run_loop.add_hook(hook);
        }
        run_loop.set_debug_capture(self.debug_capture);

        AntDriver::new(run_loop, ctx, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_builder_defaults() {
        let builder = AntBuilder::new();
        assert_eq!(builder.baud_rate, 115_200);
        assert_eq!(builder.transport_kind, TransportKind::Auto);
        assert!(builder.debug_capture.is_none());
        assert!(builder.devices.is_empty());
    }

    #[test]
    fn test_builder_chain() {
        let builder = AntBuilder::new()
            .port("/dev/ttyACM1")
            .baud_rate(57_600)
            .transport(TransportKind::Serial)
            .device_profile("12p,45h")
            .unwrap()
            .debug_capture(Some("capture.bin"))
            .event_queue_capacity(8);
        assert_eq!(builder.port, "/dev/ttyACM1");
        assert_eq!(builder.devices.len(), 2);
        assert_eq!(builder.debug_capture, Some(PathBuf::from("capture.bin")));
        assert_eq!(builder.event_queue_capacity, 8);
    }

    #[test]
    fn test_builder_rejects_bad_profile() {
        let result = AntBuilder::new().device_profile("12k");
        assert!(matches!(
            result,
            Err(DriverError::Config(ConfigError::UnknownSuffix { .. }))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = DriverConfig {
            devices: "7d".to_string(),
            ..Default::default()
        };
        let builder = AntBuilder::from_config(&config).unwrap();
        assert_eq!(builder.devices.len(), 1);
        assert_eq!(builder.debug_capture, Some(PathBuf::from("antlog.bin")));
    }
}
