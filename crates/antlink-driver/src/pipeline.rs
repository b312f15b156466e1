//! Pipeline 运行循环模块
//!
//! run-loop 独占传输层和全部通道状态：逐字节读取、解帧、分发到通道，
//! 并把通道事件转换为遥测快照和控制方事件。

use crate::capture::DebugCapture;
use crate::channel::{ChannelEvent, ChannelIndex, MessageSink};
use crate::config::DeviceSpec;
use crate::error::DriverError;
use crate::hooks::{FrameCallback, HookManager};
use crate::pool::ChannelPool;
use crate::state::{DriverContext, DriverEvent};
use crate::telemetry::RealtimeData;
use antlink_protocol::control;
use antlink_protocol::{
    ANT_PLUS_NETWORK_KEY, ANT_SPORT_NETWORK_NUMBER, AntMessage, EventCode, FrameDecoder,
    MAX_MESSAGE_SIZE, MessageId, SensorKind, TX_PADDING_LENGTH,
};
use antlink_transport::Transport;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 没有配置设备时的自动配对（槽位按数组顺序）
pub const DEFAULT_PAIRING: [SensorKind; 4] = [
    SensorKind::Power,
    SensorKind::SpeedCadence,
    SensorKind::Cadence,
    SensorKind::HeartRate,
];

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use antlink_driver::PipelineConfig;
///
/// // 默认：没有可读字节时休眠 5ms
/// let config = PipelineConfig::default();
/// assert_eq!(config.idle_sleep_ms, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 没有可读字节（或读取失败）时的休眠时间（毫秒）
    pub idle_sleep_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { idle_sleep_ms: 5 }
    }
}

/// 消息去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// 交给低 3 位通道号对应的通道
    Channel,
    /// 发送失败，暂不重试
    Swallow,
    /// 版本/能力/序列号，只记录
    Info,
    Ignore,
}

fn route(msg: &AntMessage) -> Route {
    match msg.message_id() {
        Some(MessageId::ChannelEvent)
            if msg.event_code() == u8::from(EventCode::TransferTxFailed) =>
        {
            Route::Swallow
        },
        Some(id) if id == MessageId::ChannelEvent || id.is_channel_addressed() => Route::Channel,
        Some(id) if id.is_informational() => Route::Info,
        _ => Route::Ignore,
    }
}

/// 把消息编码写入传输层，每条消息后追加填充字节
struct TransportSink<'a, T: Transport> {
    transport: &'a mut T,
    hooks: &'a HookManager,
}

impl<T: Transport> MessageSink for TransportSink<'_, T> {
    fn send_message(&mut self, msg: &AntMessage) {
        let (frame, len) = msg.encode();
        let mut buf = [0u8; MAX_MESSAGE_SIZE + TX_PADDING_LENGTH];
        buf[..len].copy_from_slice(&frame[..len]);

        trace!("TX {:02X?}", &frame[..len]);
        match self.transport.write(&buf[..len + TX_PADDING_LENGTH]) {
            Ok(_) => self.hooks.trigger_all_sent(msg),
            Err(e) => warn!("Failed to send message 0x{:02X}: {}", msg.id, e),
        }
    }
}

/// 驱动运行循环
pub struct RunLoop<T: Transport> {
    transport: T,
    decoder: FrameDecoder,
    pool: ChannelPool,
    devices: Vec<DeviceSpec>,
    hooks: HookManager,
    ctx: Arc<DriverContext>,
    config: PipelineConfig,
    telemetry: RealtimeData,
    capture_path: Option<PathBuf>,
    /// 传输层打开后才创建，控制方共享同一个句柄以便关闭
    capture: Arc<OnceLock<DebugCapture>>,
}

impl<T: Transport> RunLoop<T> {
    pub fn new(
        transport: T,
        devices: Vec<DeviceSpec>,
        ctx: Arc<DriverContext>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
            pool: ChannelPool::new(),
            devices,
            hooks: HookManager::new(),
            ctx,
            config,
            telemetry: RealtimeData::default(),
            capture_path: None,
            capture: Arc::new(OnceLock::new()),
        }
    }

    /// 设置调试录制文件（在 `startup` 打开传输层成功后才截断创建）
    pub fn set_debug_capture(&mut self, path: Option<PathBuf>) {
        self.capture_path = path;
    }

    /// 调试录制句柄（未创建时为空）
    pub fn debug_capture(&self) -> Arc<OnceLock<DebugCapture>> {
        self.capture.clone()
    }

    /// 注册钩子（必须在 `run` 之前）
    pub fn add_hook(&mut self, callback: Arc<dyn FrameCallback>) {
        self.hooks.add_callback(callback);
    }

    pub fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 打开传输层，复位设备，设置网络密钥并发起配对
    pub fn startup(&mut self) -> Result<(), DriverError> {
        self.transport.open()?;
        info!("Opened ANT transport {}", self.transport.describe());
        self.open_capture();

        self.pool.reset();
        self.decoder.reset();
        self.telemetry = RealtimeData::default();
        self.ctx.publish(self.telemetry);

        let mut sink = TransportSink {
            transport: &mut self.transport,
            hooks: &self.hooks,
        };
        sink.send_message(&control::reset_system());
        sink.send_message(&control::set_network_key(
            ANT_SPORT_NETWORK_NUMBER,
            &ANT_PLUS_NETWORK_KEY,
        ));

        if self.devices.is_empty() {
            debug!("No devices configured, auto-pairing");
            for (slot, kind) in DEFAULT_PAIRING.into_iter().enumerate() {
                self.pool.add_device(0, kind.into(), ChannelIndex::new(slot), &mut sink);
            }
        } else {
            for spec in self.devices.iter() {
                if !self.pool.add_device(spec.device_number, spec.channel_type, None, &mut sink) {
                    warn!("Could not pair configured device {}", spec);
                }
            }
        }

        self.drain_events();
        Ok(())
    }

    /// 读取并处理一个字节
    ///
    /// 返回是否读到了字节。没有字节或读取失败时休眠 `idle_sleep_ms`。
    pub fn poll_once(&mut self) -> bool {
        let mut byte = [0u8; 1];
        match self.transport.read(&mut byte) {
            Ok(n) if n > 0 => {
                if let Some(msg) = self.decoder.push(byte[0]) {
                    self.process_message(&msg);
                }
                true
            },
            Ok(_) => {
                spin_sleep::sleep(Duration::from_millis(self.config.idle_sleep_ms));
                false
            },
            Err(e) => {
                trace!("Transport read failed: {}", e);
                spin_sleep::sleep(Duration::from_millis(self.config.idle_sleep_ms));
                false
            },
        }
    }

    /// 处理一条校验通过的消息
    pub fn process_message(&mut self, msg: &AntMessage) {
        trace!("RX {:?}", msg);
        self.hooks.trigger_all(msg);

        let mut sink = TransportSink {
            transport: &mut self.transport,
            hooks: &self.hooks,
        };
        match route(msg) {
            Route::Swallow => trace!("Transfer failed on channel {}", msg.channel()),
            Route::Channel => {
                self.pool.dispatch(msg, Instant::now(), &mut sink);
            },
            Route::Info => debug!("Device info 0x{:02X}: {:02X?}", msg.id, msg.data_slice()),
            Route::Ignore => trace!("Ignoring message 0x{:02X}", msg.id),
        }

        self.drain_events();
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.pool.pop_event() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::DeviceIdentified {
                channel,
                device_number,
                device_code,
            } => {
                self.ctx.emit(DriverEvent::DeviceFound {
                    channel: channel.as_u8(),
                    device_number,
                    device_type: device_code,
                });
                // 伴随通道识别后才能关联
                if self
                    .pool
                    .channel(channel)
                    .channel_type()
                    .kind()
                    .is_some_and(SensorKind::is_composite_family)
                {
                    self.associate();
                }
            },
            ChannelEvent::MessageDropped(channel) => trace!("Channel {} dropped a message", channel),
            ChannelEvent::ConnectionLost(channel) => {
                info!("Channel {} lost its device", channel);
                self.ctx.emit(DriverEvent::DeviceLost {
                    channel: channel.as_u8(),
                });
            },
            ChannelEvent::DataStale(channel) => {
                debug!("Channel {} data is stale", channel);
                let slot = self.pool.channel(channel);
                if let Some(kind) = slot.channel_type().kind() {
                    self.telemetry.clear(kind, slot.is_alternate());
                    self.ctx.publish(self.telemetry);
                }
            },
            ChannelEvent::SearchTimeout(channel) => {
                self.ctx.emit(DriverEvent::SearchTimeout {
                    channel: channel.as_u8(),
                });
                self.start_waiting_search();
            },
            ChannelEvent::SearchCompleted(channel) => {
                debug!("Channel {} search completed", channel);
                self.start_waiting_search();
            },
            ChannelEvent::CompositeDetected(_) => self.associate(),
            ChannelEvent::ControlAssociated { channel, control } => {
                debug!("Channel {} controlled by channel {}", channel, control);
            },
            ChannelEvent::Removed(channel) => debug!("Channel {} released", channel),
            ChannelEvent::Telemetry { reading, .. } => {
                self.telemetry.apply(reading);
                self.ctx.publish(self.telemetry);
            },
        }
    }

    fn associate(&mut self) {
        let mut sink = TransportSink {
            transport: &mut self.transport,
            hooks: &self.hooks,
        };
        self.pool.associate_control_channels(&mut sink);
    }

    fn start_waiting_search(&mut self) {
        let mut sink = TransportSink {
            transport: &mut self.transport,
            hooks: &self.hooks,
        };
        self.pool.start_waiting_search(&mut sink);
    }

    fn open_capture(&mut self) {
        let Some(path) = self.capture_path.take() else {
            return;
        };
        match DebugCapture::create(&path) {
            Ok(capture) => {
                self.hooks.add_callback(capture.hook());
                if self.capture.set(capture).is_err() {
                    warn!("Debug capture already open, ignoring {}", path.display());
                }
            },
            Err(e) => warn!("Debug capture disabled, cannot open {}: {}", path.display(), e),
        }
    }

    fn shutdown(&mut self) {
        if let Some(capture) = self.capture.get() {
            capture.close();
        }
        if let Err(e) = self.transport.close() {
            warn!("Failed to close transport: {}", e);
        }
        info!("ANT driver stopped");
    }

    /// 运行直到控制状态离开 Running/Paused
    ///
    /// 传输层打开失败时把状态置为 Stopped 并返回错误，不处理任何字节。
    pub fn run(mut self) -> Result<(), DriverError> {
        #[cfg(feature = "realtime")]
        {
            use thread_priority::*;

            match set_current_thread_priority(ThreadPriority::Max) {
                Ok(_) => info!("Run-loop thread priority set to MAX (realtime)"),
                Err(e) => warn!(
                    "Failed to set run-loop thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                ),
            }
        }

        if let Err(e) = self.startup() {
            error!("Failed to start ANT driver on {}: {}", self.transport.describe(), e);
            self.ctx.status.stop();
            return Err(e);
        }

        while self.ctx.status.get().is_running() {
            self.poll_once();
        }

        self.shutdown();
        Ok(())
    }
}
