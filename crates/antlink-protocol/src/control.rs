//! 命令消息构建
//!
//! 驱动启动和通道配置过程中发出的命令消息。所有构建器的载荷长度固定且合法，
//! 因此直接返回 `AntMessage`。

use crate::AntMessage;
use crate::ids::*;

/// 由固定长度载荷构造消息（载荷长度在编译期已确定合法）
fn build<const N: usize>(id: MessageId, payload: [u8; N]) -> AntMessage {
    const { assert!(N >= 1 && N <= MAX_DATA_LENGTH) };
    let mut data = [0u8; MAX_DATA_LENGTH];
    data[..N].copy_from_slice(&payload);
    AntMessage {
        id: id.into(),
        len: N as u8,
        data,
    }
}

/// 系统复位
pub fn reset_system() -> AntMessage {
    build(MessageId::ResetSystem, [0x00])
}

/// 设置网络密钥
pub fn set_network_key(network: u8, key: &[u8; NETWORK_KEY_LENGTH]) -> AntMessage {
    let mut payload = [0u8; NETWORK_KEY_LENGTH + 1];
    payload[0] = network;
    payload[1..].copy_from_slice(key);
    build(MessageId::NetworkKey, payload)
}

/// 释放通道
pub fn unassign_channel(channel: u8) -> AntMessage {
    build(MessageId::UnassignChannel, [channel])
}

/// 分配通道（通道类型 0x00 = 双向接收）
pub fn assign_channel(channel: u8, channel_type: u8, network: u8) -> AntMessage {
    build(MessageId::AssignChannel, [channel, channel_type, network])
}

/// 设置通道 ID（设备号 0 表示通配）
pub fn set_channel_id(
    channel: u8,
    device_number: u16,
    device_code: u8,
    transmission_type: u8,
) -> AntMessage {
    let [lo, hi] = device_number.to_le_bytes();
    build(
        MessageId::ChannelId,
        [channel, lo, hi, device_code, transmission_type],
    )
}

/// 设置通道周期
pub fn set_channel_period(channel: u8, period: u16) -> AntMessage {
    let [lo, hi] = period.to_le_bytes();
    build(MessageId::ChannelPeriod, [channel, lo, hi])
}

/// 设置搜索超时（单位 2.5 秒）
pub fn set_search_timeout(channel: u8, timeout: u8) -> AntMessage {
    build(MessageId::SearchTimeout, [channel, timeout])
}

/// 设置射频频率
pub fn set_channel_frequency(channel: u8, frequency: u8) -> AntMessage {
    build(MessageId::ChannelRfFrequency, [channel, frequency])
}

/// 打开通道
pub fn open_channel(channel: u8) -> AntMessage {
    build(MessageId::OpenChannel, [channel])
}

/// 关闭通道
pub fn close_channel(channel: u8) -> AntMessage {
    build(MessageId::CloseChannel, [channel])
}

/// 请求消息（例如请求通道 ID）
pub fn request_message(channel: u8, requested: MessageId) -> AntMessage {
    build(MessageId::RequestMessage, [channel, requested.into()])
}

/// 秒数换算为搜索超时硬件单位
pub fn search_timeout_units(seconds: f64) -> u8 {
    (seconds / SEARCH_TIMEOUT_UNIT_SECS).clamp(0.0, u8::MAX as f64) as u8
}
