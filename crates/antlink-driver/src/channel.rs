//! 逻辑通道
//!
//! 每个槽位对应一条与物理传感器的无线链路。通道只负责自身的配置状态机、
//! 搜索/丢失处理和遥测解码：
//!
//! - 发出的命令全部写入调用方提供的 [`MessageSink`]
//! - 需要上报的状态变化以 [`ChannelEvent`] 的形式返回，由池和 run-loop 处理
//! - 通道从不回调到池中
//!
//! # 配置序列
//!
//! 每一步都在收到上一步的 `RESPONSE_NO_ERROR` 后发出：
//!
//! ```text
//! unassign -> assign -> channel id -> search timeout -> period -> frequency -> open
//! ```

use crate::telemetry::{
    CommonPage, LEGACY_SOFTWARE_REVISION, Payload, QUARQ_MANUFACTURER_ID, Reading,
    RevolutionSample, RevolutionTracker, decode_common_page, decode_heart_rate,
    decode_standard_power,
};
use antlink_protocol::control::{self, search_timeout_units};
use antlink_protocol::sensor::{self, ChannelType, SensorKind};
use antlink_protocol::{AntMessage, EventCode, MAX_CHANNELS, MessageId};
use smallvec::SmallVec;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 快速搜索超时（秒）
pub const QUICK_SEARCH_TIMEOUT_SECS: f64 = 10.0;

/// 丢失后重新搜索的超时（秒）
pub const LOST_SEARCH_TIMEOUT_SECS: f64 = 30.0;

/// 丢包上报的最小间隔
pub const DROP_REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// 超过此时间没有收到数据即视为过期
pub const STALE_DATA_TIMEOUT: Duration = Duration::from_secs(2);

/// 双向接收通道
const CHANNEL_TYPE_RX: u8 = 0x00;

/// 通道状态消息中的状态位
const CHANNEL_STATE_MASK: u8 = 0x03;
const CHANNEL_STATE_UNASSIGNED: u8 = 0;
const CHANNEL_STATE_SEARCHING: u8 = 2;

/// 设备类型码中的配对位
const DEVICE_CODE_PAIRING_BIT: u8 = 0x80;

/// 通道槽位索引（总是小于 `MAX_CHANNELS`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// 越界时返回 None
    pub fn new(index: usize) -> Option<Self> {
        (index < MAX_CHANNELS).then_some(Self(index as u8))
    }

    /// 调用方保证 `slot < MAX_CHANNELS`
    pub(crate) const fn from_slot(slot: usize) -> Self {
        Self(slot as u8)
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// 所有槽位，按索引升序
    pub fn all() -> impl Iterator<Item = Self> {
        (0..MAX_CHANNELS as u8).map(Self)
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 发出消息的出口
///
/// run-loop 的实现把消息编码后写入传输层；测试中直接收集到 `Vec`。
pub trait MessageSink {
    fn send_message(&mut self, msg: &AntMessage);
}

impl MessageSink for Vec<AntMessage> {
    fn send_message(&mut self, msg: &AntMessage) {
        self.push(*msg);
    }
}

/// 通道产生的事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelEvent {
    /// 收到通道 ID，设备已识别
    DeviceIdentified {
        channel: ChannelIndex,
        device_number: u16,
        device_code: u8,
    },
    /// 接收失败（限频上报）
    MessageDropped(ChannelIndex),
    /// 连接丢失
    ConnectionLost(ChannelIndex),
    /// 数据过期
    DataStale(ChannelIndex),
    /// 快速搜索超时，通道进入等待
    SearchTimeout(ChannelIndex),
    /// 快速搜索成功结束
    SearchCompleted(ChannelIndex),
    /// 复合功率计状态变化（需要重新关联控制通道）
    CompositeDetected(ChannelIndex),
    /// 控制通道关联完成
    ControlAssociated {
        channel: ChannelIndex,
        control: ChannelIndex,
    },
    /// 设备已从槽位移除
    Removed(ChannelIndex),
    /// 遥测读数
    Telemetry {
        channel: ChannelIndex,
        reading: Reading,
    },
}

/// 通道事件批次（大多数消息产生 0~2 个事件）
pub type ChannelEvents = SmallVec<[ChannelEvent; 4]>;

/// 搜索标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFlags {
    /// 快速搜索进行中
    pub quick: bool,
    /// 快速搜索超时，等待重新搜索
    pub waiting: bool,
}

/// 复合功率计状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeInfo {
    pub is_composite: bool,
    /// 主软件版本（收到产品信息页之后才知道）
    pub sw_revision: Option<u8>,
}

impl CompositeInfo {
    /// 旧协议：控制数据走单独的现代协议通道
    pub fn is_legacy(&self) -> bool {
        self.is_composite
            && self
                .sw_revision
                .is_some_and(|revision| revision < LEGACY_SOFTWARE_REVISION)
    }
}

/// 逻辑通道槽位
#[derive(Debug, Clone)]
pub struct Channel {
    index: ChannelIndex,
    channel_type: ChannelType,
    device_number: u16,
    /// 传感器上报的设备类型码
    device_code: u8,
    flags: SearchFlags,
    assigned: bool,
    searching: bool,
    identified: bool,
    alternate: bool,
    composite: CompositeInfo,
    control_channel: Option<ChannelIndex>,
    /// 最后一个被确认的配置命令
    config_state: Option<MessageId>,
    last_message_at: Option<Instant>,
    last_drop_report: Option<Instant>,
    messages_received: u64,
    messages_dropped: u64,
    stale: bool,
    speed: RevolutionTracker,
    cadence: RevolutionTracker,
}

impl Channel {
    pub fn new(index: ChannelIndex) -> Self {
        Self {
            index,
            channel_type: ChannelType::Unused,
            device_number: 0,
            device_code: 0,
            flags: SearchFlags::default(),
            assigned: false,
            searching: false,
            identified: false,
            alternate: false,
            composite: CompositeInfo::default(),
            control_channel: None,
            config_state: None,
            last_message_at: None,
            last_drop_report: None,
            messages_received: 0,
            messages_dropped: 0,
            stale: false,
            speed: RevolutionTracker::default(),
            cadence: RevolutionTracker::default(),
        }
    }

    /// 恢复为空闲槽位
    pub fn reset(&mut self) {
        *self = Self::new(self.index);
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    pub fn device_number(&self) -> u16 {
        self.device_number
    }

    pub fn device_code(&self) -> u8 {
        self.device_code
    }

    pub fn flags(&self) -> SearchFlags {
        self.flags
    }

    pub fn is_unused(&self) -> bool {
        self.channel_type.is_unused()
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned
    }

    pub fn is_identified(&self) -> bool {
        self.identified
    }

    pub fn is_alternate(&self) -> bool {
        self.alternate
    }

    pub fn set_alternate(&mut self, alternate: bool) {
        self.alternate = alternate;
    }

    pub fn composite(&self) -> CompositeInfo {
        self.composite
    }

    pub(crate) fn mark_composite(&mut self) {
        self.composite.is_composite = true;
    }

    pub fn control_channel(&self) -> Option<ChannelIndex> {
        self.control_channel
    }

    pub fn set_control_channel(&mut self, control: Option<ChannelIndex>) {
        self.control_channel = control;
    }

    pub(crate) fn take_control_channel(&mut self) -> Option<ChannelIndex> {
        self.control_channel.take()
    }

    pub fn config_state(&self) -> Option<MessageId> {
        self.config_state
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// 设备号与类型精确匹配
    pub fn matches(&self, device_number: u16, channel_type: ChannelType) -> bool {
        self.device_number == device_number && self.channel_type == channel_type
    }

    /// 以给定身份打开通道并开始快速搜索
    pub fn open(
        &mut self,
        device_number: u16,
        channel_type: ChannelType,
        sink: &mut dyn MessageSink,
    ) {
        self.channel_type = channel_type;
        self.device_number = device_number;
        self.device_code = 0;
        self.flags = SearchFlags {
            quick: true,
            waiting: false,
        };
        self.searching = true;
        self.identified = false;
        self.stale = false;
        self.last_message_at = None;
        self.speed.reset();
        self.cadence.reset();

        info!(
            "Opening channel {} for {} {}{}",
            self.index,
            sensor::name_for(channel_type),
            device_number,
            sensor::suffix_for(channel_type)
        );

        if self.assigned {
            sink.send_message(&control::unassign_channel(self.index.as_u8()));
        } else {
            self.attempt_transition(MessageId::UnassignChannel, sink);
        }
    }

    /// 关闭通道并恢复为空闲槽位
    ///
    /// 只有在用槽位才会产生 `ConnectionLost`。
    pub fn close(&mut self, sink: &mut dyn MessageSink) -> Option<ChannelEvent> {
        let event = (!self.is_unused()).then_some(ChannelEvent::ConnectionLost(self.index));
        debug!("Closing channel {}", self.index);
        sink.send_message(&control::close_channel(self.index.as_u8()));
        self.reset();
        event
    }

    /// 从等待状态重新开始（慢速）搜索
    pub(crate) fn restart_search(&mut self, sink: &mut dyn MessageSink) {
        self.flags = SearchFlags::default();
        self.searching = true;
        sink.send_message(&control::unassign_channel(self.index.as_u8()));
    }

    /// 处理路由到本通道的消息
    pub fn receive(
        &mut self,
        msg: &AntMessage,
        now: Instant,
        sink: &mut dyn MessageSink,
    ) -> ChannelEvents {
        let mut events = ChannelEvents::new();
        match msg.message_id() {
            Some(MessageId::ChannelEvent) => self.handle_channel_event(msg, now, sink, &mut events),
            Some(MessageId::BroadcastData | MessageId::AcknowledgedData | MessageId::BurstData) => {
                self.handle_data(msg, now, sink, &mut events)
            },
            Some(MessageId::ChannelId) => self.handle_channel_id(msg, sink, &mut events),
            Some(MessageId::ChannelStatus) => self.handle_channel_status(msg),
            _ => trace!("Channel {} ignoring message 0x{:02X}", self.index, msg.id),
        }
        events
    }

    fn handle_channel_event(
        &mut self,
        msg: &AntMessage,
        now: Instant,
        sink: &mut dyn MessageSink,
        events: &mut ChannelEvents,
    ) {
        let code = msg.event_code();

        if !msg.is_rf_event() {
            let command = msg.event_message_id();
            if code != u8::from(EventCode::ResponseNoError) {
                warn!(
                    "Channel {} command 0x{:02X} rejected with code 0x{:02X}",
                    self.index, command, code
                );
                return;
            }
            match MessageId::try_from(command) {
                Ok(acked) => self.attempt_transition(acked, sink),
                Err(_) => trace!("Channel {} ack for unknown command 0x{:02X}", self.index, command),
            }
            return;
        }

        match EventCode::try_from(code) {
            Ok(EventCode::ChannelClosed) => {
                if self.flags.waiting {
                    debug!("Channel {} closed, waiting to search again", self.index);
                } else {
                    sink.send_message(&control::unassign_channel(self.index.as_u8()));
                }
            },
            Ok(EventCode::RxSearchTimeout) => {
                if self.flags.quick {
                    debug!("Channel {} quick search timed out", self.index);
                    self.flags = SearchFlags {
                        quick: false,
                        waiting: true,
                    };
                    self.searching = false;
                    events.push(ChannelEvent::SearchTimeout(self.index));
                } else {
                    debug!("Channel {} search timed out, releasing", self.index);
                    if !self.is_unused() {
                        events.push(ChannelEvent::ConnectionLost(self.index));
                    }
                    self.reset();
                    sink.send_message(&control::unassign_channel(self.index.as_u8()));
                }
            },
            Ok(EventCode::RxFail) => {
                self.messages_dropped += 1;
                let report_due = self
                    .last_drop_report
                    .is_none_or(|at| now.saturating_duration_since(at) >= DROP_REPORT_INTERVAL);
                if report_due {
                    self.last_drop_report = Some(now);
                    events.push(ChannelEvent::MessageDropped(self.index));
                }
                if let Some(at) = self.last_message_at
                    && !self.stale
                    && now.saturating_duration_since(at) > STALE_DATA_TIMEOUT
                {
                    self.stale = true;
                    events.push(ChannelEvent::DataStale(self.index));
                }
            },
            Ok(EventCode::RxFailGoToSearch) => {
                debug!("Channel {} lost its device, searching", self.index);
                self.searching = true;
                events.push(ChannelEvent::ConnectionLost(self.index));
            },
            Ok(other) => trace!("Channel {} event {:?}", self.index, other),
            Err(_) => trace!("Channel {} unknown event code 0x{:02X}", self.index, code),
        }
    }

    /// 配置状态机：根据被确认的命令发出下一步
    fn attempt_transition(&mut self, acked: MessageId, sink: &mut dyn MessageSink) {
        let previous = self.config_state.replace(acked);
        let ch = self.index.as_u8();

        match acked {
            MessageId::UnassignChannel => self.assigned = false,
            MessageId::AssignChannel => self.assigned = true,
            _ => {},
        }

        let Some(profile) = sensor::lookup_by_kind(self.channel_type).filter(|_| !self.is_unused())
        else {
            trace!("Channel {} idle after {:?}", self.index, acked);
            return;
        };

        match acked {
            MessageId::UnassignChannel => {
                sink.send_message(&control::assign_channel(ch, CHANNEL_TYPE_RX, profile.network));
            },
            MessageId::AssignChannel => {
                sink.send_message(&control::set_channel_id(
                    ch,
                    self.device_number,
                    profile.device_code,
                    0,
                ));
            },
            MessageId::ChannelId => {
                let seconds = if self.flags.quick {
                    QUICK_SEARCH_TIMEOUT_SECS
                } else {
                    LOST_SEARCH_TIMEOUT_SECS
                };
                sink.send_message(&control::set_search_timeout(ch, search_timeout_units(seconds)));
            },
            // 识别后重新设置超时也会走到这里，此时不再继续配置
            MessageId::SearchTimeout if previous == Some(MessageId::ChannelId) => {
                sink.send_message(&control::set_channel_period(ch, profile.period));
            },
            MessageId::ChannelPeriod => {
                sink.send_message(&control::set_channel_frequency(ch, profile.frequency));
            },
            MessageId::ChannelRfFrequency => {
                sink.send_message(&control::open_channel(ch));
            },
            MessageId::OpenChannel => {
                debug!("Channel {} open and searching", self.index);
            },
            other => trace!("Channel {} ack for {:?}", self.index, other),
        }
    }

    fn handle_data(
        &mut self,
        msg: &AntMessage,
        now: Instant,
        sink: &mut dyn MessageSink,
        events: &mut ChannelEvents,
    ) {
        self.last_message_at = Some(now);
        self.stale = false;
        self.messages_received += 1;

        if !self.identified {
            sink.send_message(&control::request_message(self.index.as_u8(), MessageId::ChannelId));
            return;
        }

        let mut payload: Payload = [0; 8];
        payload.copy_from_slice(&msg.data[1..]);

        let channel = self.index;
        let reading = match self.channel_type.kind() {
            Some(SensorKind::HeartRate) => Some(Reading::HeartRate(decode_heart_rate(&payload))),
            Some(SensorKind::Power) => match decode_standard_power(&payload) {
                Some((watts, cadence)) => Some(Reading::Power {
                    watts,
                    cadence,
                    alternate: self.alternate,
                }),
                None => {
                    if let Some(page) = decode_common_page(&payload) {
                        self.update_composite(page, events);
                    }
                    None
                },
            },
            Some(SensorKind::Speed) => self
                .speed
                .update(RevolutionSample::read(&payload, 4))
                .map(Reading::WheelRpm),
            Some(SensorKind::Cadence) => self
                .cadence
                .update(RevolutionSample::read(&payload, 4))
                .map(Reading::Cadence),
            Some(SensorKind::SpeedCadence) => {
                if let Some(rpm) = self.cadence.update(RevolutionSample::read(&payload, 0)) {
                    events.push(ChannelEvent::Telemetry {
                        channel,
                        reading: Reading::Cadence(rpm),
                    });
                }
                self.speed
                    .update(RevolutionSample::read(&payload, 4))
                    .map(Reading::WheelRpm)
            },
            Some(SensorKind::Quarq | SensorKind::FastQuarq | SensorKind::FastQuarqNew) | None => {
                None
            },
        };

        if let Some(reading) = reading {
            trace!("Channel {} reading {:?}", channel, reading);
            events.push(ChannelEvent::Telemetry { channel, reading });
        }
    }

    fn update_composite(&mut self, page: CommonPage, events: &mut ChannelEvents) {
        let before = self.composite;
        match page {
            CommonPage::Manufacturer {
                manufacturer_id, ..
            } => {
                self.composite.is_composite = manufacturer_id == QUARQ_MANUFACTURER_ID;
            },
            CommonPage::Product { sw_revision, .. } => {
                self.composite.sw_revision = Some(sw_revision);
            },
        }

        let changed = before.is_composite != self.composite.is_composite
            || before.is_legacy() != self.composite.is_legacy();
        if changed {
            debug!(
                "Channel {} composite={} legacy={}",
                self.index,
                self.composite.is_composite,
                self.composite.is_legacy()
            );
            events.push(ChannelEvent::CompositeDetected(self.index));
        }
    }

    fn handle_channel_id(
        &mut self,
        msg: &AntMessage,
        sink: &mut dyn MessageSink,
        events: &mut ChannelEvents,
    ) {
        let device_number = u16::from_le_bytes([msg.data[1], msg.data[2]]);
        let device_code = msg.data[3] & !DEVICE_CODE_PAIRING_BIT;

        self.device_number = device_number;
        self.device_code = device_code;
        self.identified = true;
        self.searching = false;

        info!(
            "Channel {} found {} {}{}",
            self.index,
            sensor::description_for_device_code(device_code),
            device_number,
            sensor::suffix_for_device_code(device_code)
        );
        events.push(ChannelEvent::DeviceIdentified {
            channel: self.index,
            device_number,
            device_code,
        });

        if self.flags.quick {
            self.flags.quick = false;
            sink.send_message(&control::set_search_timeout(
                self.index.as_u8(),
                search_timeout_units(LOST_SEARCH_TIMEOUT_SECS),
            ));
            events.push(ChannelEvent::SearchCompleted(self.index));
        }
    }

    fn handle_channel_status(&mut self, msg: &AntMessage) {
        let state = msg.data[1] & CHANNEL_STATE_MASK;
        self.assigned = state != CHANNEL_STATE_UNASSIGNED;
        self.searching = state == CHANNEL_STATE_SEARCHING;
        trace!("Channel {} status {}", self.index, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antlink_protocol::RF_EVENT_ID;

    fn idx(i: usize) -> ChannelIndex {
        ChannelIndex::new(i).unwrap()
    }

    fn ack(channel: u8, command: MessageId) -> AntMessage {
        AntMessage::new(MessageId::ChannelEvent, &[channel, command.into(), 0x00]).unwrap()
    }

    fn rf_event(channel: u8, code: EventCode) -> AntMessage {
        AntMessage::new(MessageId::ChannelEvent, &[channel, RF_EVENT_ID, code.into()]).unwrap()
    }

    fn channel_id(channel: u8, device_number: u16, device_code: u8) -> AntMessage {
        let [lo, hi] = device_number.to_le_bytes();
        AntMessage::new(MessageId::ChannelId, &[channel, lo, hi, device_code, 0x01]).unwrap()
    }

    fn broadcast(channel: u8, payload: [u8; 8]) -> AntMessage {
        let mut data = [channel; 9];
        data[1..].copy_from_slice(&payload);
        AntMessage::new(MessageId::BroadcastData, &data).unwrap()
    }

    fn ids(sent: &[AntMessage]) -> Vec<u8> {
        sent.iter().map(|m| m.id).collect()
    }

    /// 打开并走完整个配置序列
    fn configured(kind: SensorKind, device_number: u16) -> Channel {
        let mut channel = Channel::new(idx(0));
        let mut sent = Vec::new();
        channel.open(device_number, kind.into(), &mut sent);
        for step in [
            MessageId::AssignChannel,
            MessageId::ChannelId,
            MessageId::SearchTimeout,
            MessageId::ChannelPeriod,
            MessageId::ChannelRfFrequency,
            MessageId::OpenChannel,
        ] {
            channel.receive(&ack(0, step), Instant::now(), &mut sent);
        }
        channel
    }

    #[test]
    fn test_channel_index_bounds() {
        assert!(ChannelIndex::new(MAX_CHANNELS - 1).is_some());
        assert!(ChannelIndex::new(MAX_CHANNELS).is_none());
        assert_eq!(ChannelIndex::all().count(), MAX_CHANNELS);
    }

    #[test]
    fn test_open_unassigned_channel_sends_assign() {
        let mut channel = Channel::new(idx(2));
        let mut sent = Vec::new();
        channel.open(0, SensorKind::HeartRate.into(), &mut sent);

        assert_eq!(sent, vec![control::assign_channel(2, 0x00, 1)]);
        assert!(channel.is_searching());
        assert!(channel.flags().quick);
    }

    #[test]
    fn test_open_assigned_channel_sends_unassign() {
        let mut channel = configured(SensorKind::Power, 0);
        assert!(channel.is_assigned());

        let mut sent = Vec::new();
        channel.open(0, SensorKind::Power.into(), &mut sent);
        assert_eq!(sent, vec![control::unassign_channel(0)]);
    }

    #[test]
    fn test_full_configuration_sequence() {
        let mut channel = Channel::new(idx(1));
        let mut sent = Vec::new();
        let now = Instant::now();
        channel.open(1234, SensorKind::Power.into(), &mut sent);

        channel.receive(&ack(1, MessageId::AssignChannel), now, &mut sent);
        channel.receive(&ack(1, MessageId::ChannelId), now, &mut sent);
        channel.receive(&ack(1, MessageId::SearchTimeout), now, &mut sent);
        channel.receive(&ack(1, MessageId::ChannelPeriod), now, &mut sent);
        channel.receive(&ack(1, MessageId::ChannelRfFrequency), now, &mut sent);
        channel.receive(&ack(1, MessageId::OpenChannel), now, &mut sent);

        let profile = sensor::lookup_by_kind(SensorKind::Power.into()).unwrap();
        assert_eq!(
            sent,
            vec![
                control::assign_channel(1, 0x00, profile.network),
                control::set_channel_id(1, 1234, profile.device_code, 0),
                control::set_search_timeout(1, 4),
                control::set_channel_period(1, profile.period),
                control::set_channel_frequency(1, profile.frequency),
                control::open_channel(1),
            ]
        );
        assert!(channel.is_assigned());
        assert_eq!(channel.config_state(), Some(MessageId::OpenChannel));
    }

    #[test]
    fn test_rejected_command_does_not_advance() {
        let mut channel = Channel::new(idx(0));
        let mut sent = Vec::new();
        channel.open(0, SensorKind::Speed.into(), &mut sent);
        sent.clear();

        let rejected = AntMessage::new(
            MessageId::ChannelEvent,
            &[0, MessageId::AssignChannel.into(), 0x15],
        )
        .unwrap();
        let events = channel.receive(&rejected, Instant::now(), &mut sent);
        assert!(events.is_empty());
        assert!(sent.is_empty());
    }

    #[test]
    fn test_close_in_use_emits_connection_lost() {
        let mut channel = configured(SensorKind::HeartRate, 0);
        let mut sent = Vec::new();

        let event = channel.close(&mut sent);
        assert_eq!(event, Some(ChannelEvent::ConnectionLost(idx(0))));
        assert_eq!(sent, vec![control::close_channel(0)]);
        assert!(channel.is_unused());
        assert!(!channel.is_assigned());
    }

    #[test]
    fn test_close_unused_emits_nothing() {
        let mut channel = Channel::new(idx(3));
        let mut sent = Vec::new();
        assert_eq!(channel.close(&mut sent), None);
        assert_eq!(ids(&sent), vec![u8::from(MessageId::CloseChannel)]);
    }

    #[test]
    fn test_channel_closed_sends_unassign() {
        let mut channel = configured(SensorKind::HeartRate, 0);
        let mut sent = Vec::new();
        channel.receive(&rf_event(0, EventCode::ChannelClosed), Instant::now(), &mut sent);
        assert_eq!(sent, vec![control::unassign_channel(0)]);
    }

    #[test]
    fn test_quick_search_timeout_enters_waiting() {
        let mut channel = configured(SensorKind::Cadence, 0);
        let mut sent = Vec::new();
        let now = Instant::now();

        let events = channel.receive(&rf_event(0, EventCode::RxSearchTimeout), now, &mut sent);
        assert_eq!(events.as_slice(), &[ChannelEvent::SearchTimeout(idx(0))]);
        assert!(channel.flags().waiting);
        assert!(!channel.flags().quick);

        // 等待中的通道关闭后不会自行重启搜索
        channel.receive(&rf_event(0, EventCode::ChannelClosed), now, &mut sent);
        assert!(sent.is_empty());
        assert_eq!(channel.channel_type(), SensorKind::Cadence.into());
    }

    #[test]
    fn test_slow_search_timeout_releases_slot() {
        let mut channel = configured(SensorKind::Cadence, 0);
        let mut sent = Vec::new();
        let now = Instant::now();
        channel.receive(&rf_event(0, EventCode::RxSearchTimeout), now, &mut sent);
        channel.restart_search(&mut sent);
        sent.clear();

        let events = channel.receive(&rf_event(0, EventCode::RxSearchTimeout), now, &mut sent);
        assert_eq!(events.as_slice(), &[ChannelEvent::ConnectionLost(idx(0))]);
        assert!(channel.is_unused());
        assert_eq!(sent, vec![control::unassign_channel(0)]);
    }

    #[test]
    fn test_broadcast_before_identification_requests_channel_id() {
        let mut channel = configured(SensorKind::HeartRate, 0);
        let mut sent = Vec::new();

        let events = channel.receive(&broadcast(0, [0; 8]), Instant::now(), &mut sent);
        assert!(events.is_empty());
        assert_eq!(sent, vec![control::request_message(0, MessageId::ChannelId)]);
    }

    #[test]
    fn test_channel_id_after_quick_search() {
        let mut channel = configured(SensorKind::HeartRate, 0);
        let mut sent = Vec::new();

        let events = channel.receive(&channel_id(0, 4321, 0x78 | 0x80), Instant::now(), &mut sent);
        assert_eq!(
            events.as_slice(),
            &[
                ChannelEvent::DeviceIdentified {
                    channel: idx(0),
                    device_number: 4321,
                    device_code: 0x78,
                },
                ChannelEvent::SearchCompleted(idx(0)),
            ]
        );
        assert_eq!(sent, vec![control::set_search_timeout(0, 12)]);
        assert_eq!(channel.device_number(), 4321);
        assert!(!channel.is_searching());

        // 重新设置超时的确认不会重新触发配置序列
        sent.clear();
        channel.receive(&ack(0, MessageId::SearchTimeout), Instant::now(), &mut sent);
        assert!(sent.is_empty());
    }

    #[test]
    fn test_heart_rate_telemetry() {
        let mut channel = configured(SensorKind::HeartRate, 0);
        let mut sent = Vec::new();
        let now = Instant::now();
        channel.receive(&channel_id(0, 1, 0x78), now, &mut sent);

        let events = channel.receive(&broadcast(0, [0, 0, 0, 0, 0, 0, 0, 150]), now, &mut sent);
        assert_eq!(
            events.as_slice(),
            &[ChannelEvent::Telemetry {
                channel: idx(0),
                reading: Reading::HeartRate(150),
            }]
        );
    }

    #[test]
    fn test_power_telemetry_uses_alternate_flag() {
        let mut channel = configured(SensorKind::Power, 0);
        channel.set_alternate(true);
        let mut sent = Vec::new();
        let now = Instant::now();
        channel.receive(&channel_id(0, 7, 0x0B), now, &mut sent);

        let events = channel.receive(&broadcast(0, [0x10, 1, 0xFF, 85, 0, 0, 200, 0]), now, &mut sent);
        assert_eq!(
            events.as_slice(),
            &[ChannelEvent::Telemetry {
                channel: idx(0),
                reading: Reading::Power {
                    watts: 200,
                    cadence: Some(85),
                    alternate: true,
                },
            }]
        );
    }

    #[test]
    fn test_composite_detection() {
        let mut channel = configured(SensorKind::Power, 0);
        let mut sent = Vec::new();
        let now = Instant::now();
        channel.receive(&channel_id(0, 7, 0x0B), now, &mut sent);

        let manufacturer = broadcast(0, [0x50, 0xFF, 0xFF, 1, 7, 0, 0, 0]);
        let events = channel.receive(&manufacturer, now, &mut sent);
        assert_eq!(events.as_slice(), &[ChannelEvent::CompositeDetected(idx(0))]);
        assert!(channel.composite().is_composite);
        assert!(!channel.composite().is_legacy());

        // 同样的页面不会重复上报
        assert!(channel.receive(&manufacturer, now, &mut sent).is_empty());

        let product = broadcast(0, [0x51, 0xFF, 0xFF, 12, 0, 0, 0, 0]);
        let events = channel.receive(&product, now, &mut sent);
        assert_eq!(events.as_slice(), &[ChannelEvent::CompositeDetected(idx(0))]);
        assert!(channel.composite().is_legacy());
    }

    #[test]
    fn test_rx_fail_rate_limited_and_stale() {
        let mut channel = configured(SensorKind::HeartRate, 0);
        let mut sent = Vec::new();
        let t0 = Instant::now();
        channel.receive(&channel_id(0, 1, 0x78), t0, &mut sent);
        channel.receive(&broadcast(0, [0; 8]), t0, &mut sent);

        let fail = rf_event(0, EventCode::RxFail);
        let events = channel.receive(&fail, t0, &mut sent);
        assert_eq!(events.as_slice(), &[ChannelEvent::MessageDropped(idx(0))]);
        assert!(channel.receive(&fail, t0 + Duration::from_millis(500), &mut sent).is_empty());

        let later = t0 + Duration::from_millis(2500);
        let events = channel.receive(&fail, later, &mut sent);
        assert_eq!(
            events.as_slice(),
            &[
                ChannelEvent::MessageDropped(idx(0)),
                ChannelEvent::DataStale(idx(0)),
            ]
        );
        assert!(channel.is_stale());
        assert_eq!(channel.messages_dropped(), 3);

        // 过期只上报一次
        let events = channel.receive(&fail, later + Duration::from_secs(3), &mut sent);
        assert_eq!(events.as_slice(), &[ChannelEvent::MessageDropped(idx(0))]);
    }

    #[test]
    fn test_rx_fail_go_to_search() {
        let mut channel = configured(SensorKind::Speed, 0);
        let mut sent = Vec::new();
        channel.receive(&channel_id(0, 9, 0x7B), Instant::now(), &mut sent);

        let events = channel.receive(
            &rf_event(0, EventCode::RxFailGoToSearch),
            Instant::now(),
            &mut sent,
        );
        assert_eq!(events.as_slice(), &[ChannelEvent::ConnectionLost(idx(0))]);
        assert!(channel.is_searching());
    }

    #[test]
    fn test_channel_status_updates_flags() {
        let mut channel = Channel::new(idx(0));
        let mut sent = Vec::new();
        let status = AntMessage::new(MessageId::ChannelStatus, &[0, 0x02]).unwrap();
        channel.receive(&status, Instant::now(), &mut sent);
        assert!(channel.is_assigned());
        assert!(channel.is_searching());
    }
}
