//! 通道池
//!
//! 固定 `MAX_CHANNELS` 个槽位的 arena，以 [`ChannelIndex`] 作为句柄。负责设备配对、
//! 移除、错峰重新搜索和复合功率计的控制通道关联。
//!
//! 打开/关闭/移除过程中产生的事件进入待处理队列，由 run-loop 统一取出处理。

use crate::channel::{Channel, ChannelEvent, ChannelIndex, MessageSink};
use antlink_protocol::sensor::{self, ChannelType, SensorKind};
use antlink_protocol::{AntMessage, MAX_CHANNELS};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, trace, warn};

const POWER: ChannelType = ChannelType::Sensor(SensorKind::Power);

/// 通道池
#[derive(Debug)]
pub struct ChannelPool {
    channels: [Channel; MAX_CHANNELS],
    /// 已打开的功率通道数（第二个起为备用功率）
    power_channels: usize,
    pending: VecDeque<ChannelEvent>,
}

impl Default for ChannelPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPool {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|slot| Channel::new(ChannelIndex::from_slot(slot))),
            power_channels: 0,
            pending: VecDeque::new(),
        }
    }

    /// 所有槽位恢复为空闲（run 开始时调用）
    pub fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.reset();
        }
        self.power_channels = 0;
        self.pending.clear();
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: ChannelIndex) -> &Channel {
        &self.channels[index.get()]
    }

    pub fn power_channels(&self) -> usize {
        self.power_channels
    }

    /// 在用槽位数
    pub fn used_channels(&self) -> usize {
        self.channels.iter().filter(|c| !c.is_unused()).count()
    }

    /// 请求配对
    ///
    /// - 指定 `channel`：强制关闭该槽位后按新身份打开
    /// - 非通配设备号：已有相同（设备号, 类型）的通道时直接视为成功
    /// - 否则占用第一个空闲槽位，没有空闲槽位时返回 false
    pub fn add_device(
        &mut self,
        device_number: u16,
        channel_type: ChannelType,
        channel: Option<ChannelIndex>,
        sink: &mut dyn MessageSink,
    ) -> bool {
        if channel_type.is_unused() {
            warn!("Refusing to pair device {} with an unused channel type", device_number);
            return false;
        }

        if let Some(index) = channel {
            self.release(index, sink);
            self.claim(index, device_number, channel_type, sink);
            return true;
        }

        if device_number != 0
            && let Some(existing) = self.find_device(device_number, channel_type)
        {
            debug!(
                "Device {}{} already paired on channel {}",
                device_number,
                sensor::suffix_for(channel_type),
                existing
            );
            return true;
        }

        let Some(slot) = self.channels.iter().position(Channel::is_unused) else {
            warn!(
                "No free channel for device {}{}",
                device_number,
                sensor::suffix_for(channel_type)
            );
            return false;
        };

        self.claim(ChannelIndex::from_slot(slot), device_number, channel_type, sink);
        true
    }

    /// 按新身份打开槽位；功率通道计数，第二个起为备用功率
    fn claim(
        &mut self,
        index: ChannelIndex,
        device_number: u16,
        channel_type: ChannelType,
        sink: &mut dyn MessageSink,
    ) {
        let slot = &mut self.channels[index.get()];
        if channel_type == POWER {
            self.power_channels += 1;
            slot.set_alternate(self.power_channels > 1);
        }
        slot.open(device_number, channel_type, sink);
    }

    /// 关闭槽位并归还功率通道计数
    fn release(&mut self, index: ChannelIndex, sink: &mut dyn MessageSink) {
        let slot = &mut self.channels[index.get()];
        let was_power = slot.channel_type() == POWER;
        if let Some(event) = slot.close(sink) {
            self.pending.push_back(event);
        }
        if was_power {
            self.release_power();
        }
    }

    fn release_power(&mut self) {
        self.power_channels = self.power_channels.saturating_sub(1);
        trace!("{} power channel(s) in use", self.power_channels);
    }

    /// 移除设备（连同关联到其他槽位的控制通道一起）
    pub fn remove_device(
        &mut self,
        device_number: u16,
        channel_type: ChannelType,
        sink: &mut dyn MessageSink,
    ) -> bool {
        match self.find_device(device_number, channel_type) {
            Some(index) => {
                self.remove_at(index, sink);
                true
            },
            None => {
                debug!(
                    "No channel holds device {}{}",
                    device_number,
                    sensor::suffix_for(channel_type)
                );
                false
            },
        }
    }

    fn remove_at(&mut self, index: ChannelIndex, sink: &mut dyn MessageSink) {
        if let Some(control) = self.channels[index.get()].take_control_channel()
            && control != index
            && !self.channels[control.get()].is_unused()
        {
            self.remove_at(control, sink);
        }

        // 控制通道反向指回本槽位时，本槽位已在递归中移除
        if self.channels[index.get()].is_unused() {
            return;
        }
        self.release(index, sink);
        self.pending.push_back(ChannelEvent::Removed(index));
    }

    /// 精确匹配（设备号, 类型），返回第一个匹配的槽位
    pub fn find_device(&self, device_number: u16, channel_type: ChannelType) -> Option<ChannelIndex> {
        self.channels
            .iter()
            .find(|c| c.matches(device_number, channel_type))
            .map(Channel::index)
    }

    /// 错峰重启一个等待中的搜索
    ///
    /// 任何通道正在快速搜索时拒绝，同一时刻只允许一个快速搜索。
    pub fn start_waiting_search(&mut self, sink: &mut dyn MessageSink) -> bool {
        if self.channels.iter().any(|c| c.flags().quick) {
            return false;
        }
        match self.channels.iter_mut().find(|c| c.flags().waiting) {
            Some(channel) => {
                debug!("Restarting search on channel {}", channel.index());
                channel.restart_search(sink);
                true
            },
            None => false,
        }
    }

    /// 重新计算每个槽位的控制通道
    pub fn associate_control_channels(&mut self, sink: &mut dyn MessageSink) {
        for channel in self.channels.iter_mut() {
            channel.set_control_channel(None);
        }

        for index in ChannelIndex::all() {
            let channel = &self.channels[index.get()];
            let composite = channel.composite();
            let device_number = channel.device_number();

            match channel.channel_type().kind() {
                Some(SensorKind::Power) if composite.is_composite => {
                    if !composite.is_legacy() {
                        self.link(index, index);
                        continue;
                    }

                    let companion = SensorKind::COMPOSITE_FAMILY
                        .iter()
                        .find_map(|&kind| self.find_device(device_number, kind.into()));
                    match companion {
                        Some(control) if !self.channels[control.get()].is_searching() => {
                            self.link(index, control);
                        },
                        Some(control) => {
                            trace!("Companion channel {} for {} still searching", control, index);
                        },
                        None => {
                            debug!(
                                "Legacy composite on channel {}, pairing modern protocol for device {}",
                                index, device_number
                            );
                            self.add_device(device_number, SensorKind::Quarq.into(), None, sink);
                        },
                    }
                },
                Some(kind) if kind.is_composite_family() => {
                    let slot = &mut self.channels[index.get()];
                    slot.mark_composite();
                    slot.set_control_channel(Some(index));
                },
                _ => {},
            }
        }
    }

    fn link(&mut self, channel: ChannelIndex, control: ChannelIndex) {
        self.channels[channel.get()].set_control_channel(Some(control));
        self.pending.push_back(ChannelEvent::ControlAssociated { channel, control });
    }

    /// 路由到消息的低 3 位通道号对应的槽位
    ///
    /// 越界通道号直接忽略，返回 false。
    pub fn dispatch(&mut self, msg: &AntMessage, now: Instant, sink: &mut dyn MessageSink) -> bool {
        let Some(index) = ChannelIndex::new(msg.channel()) else {
            trace!("Dropping message for out-of-range channel {}", msg.channel());
            return false;
        };
        let channel = &mut self.channels[index.get()];
        let was_power = channel.channel_type() == POWER;
        let events = channel.receive(msg, now, sink);
        // 慢速搜索超时会在通道内部释放槽位
        if was_power && channel.is_unused() {
            self.release_power();
        }
        self.pending.extend(events);
        true
    }

    /// 取出一个待处理事件
    pub fn pop_event(&mut self) -> Option<ChannelEvent> {
        self.pending.pop_front()
    }

    /// 取出所有待处理事件
    pub fn take_events(&mut self) -> Vec<ChannelEvent> {
        self.pending.drain(..).collect()
    }
}
