//! 协议常量与消息 ID 定义
//!
//! 集中定义串口协议中的同步字节、长度上限、消息 ID 和通道事件码，
//! 避免在代码中散落"魔法数"。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 帧同步字节
pub const SYNC_BYTE: u8 = 0xA4;

/// DATA 段最大长度（LEN 字段上限）
pub const MAX_DATA_LENGTH: usize = 9;

/// 完整帧最大长度：SYNC + LEN + ID + DATA(9) + CHECKSUM
pub const MAX_MESSAGE_SIZE: usize = MAX_DATA_LENGTH + 4;

/// 逻辑通道数量
pub const MAX_CHANNELS: usize = 4;

/// 网络密钥长度
pub const NETWORK_KEY_LENGTH: usize = 8;

/// 每条发出的消息后追加的填充字节数
pub const TX_PADDING_LENGTH: usize = 5;

/// ANT+ 公共网络密钥
pub const ANT_PLUS_NETWORK_KEY: [u8; NETWORK_KEY_LENGTH] =
    [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];

/// ANT+ 运动网络号
pub const ANT_SPORT_NETWORK_NUMBER: u8 = 1;

/// 默认（公共）网络号
pub const DEFAULT_NETWORK_NUMBER: u8 = 0;

/// 通道事件中表示"射频事件"的子 ID（非命令响应）
pub const RF_EVENT_ID: u8 = 0x01;

/// 搜索超时的硬件单位（秒）
pub const SEARCH_TIMEOUT_UNIT_SECS: f64 = 2.5;

// ============================================================================
// 消息 ID
// ============================================================================

/// 消息 ID
///
/// 只覆盖驱动实际收发的消息，其余 ID 在分发时直接忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageId {
    /// 版本信息
    Version = 0x3E,
    /// 通道事件 / 命令响应
    ChannelEvent = 0x40,
    /// 释放通道
    UnassignChannel = 0x41,
    /// 分配通道
    AssignChannel = 0x42,
    /// 设置通道周期
    ChannelPeriod = 0x43,
    /// 设置搜索超时
    SearchTimeout = 0x44,
    /// 设置射频频率
    ChannelRfFrequency = 0x45,
    /// 设置网络密钥
    NetworkKey = 0x46,
    /// 系统复位
    ResetSystem = 0x4A,
    /// 打开通道
    OpenChannel = 0x4B,
    /// 关闭通道
    CloseChannel = 0x4C,
    /// 请求消息
    RequestMessage = 0x4D,
    /// 广播数据
    BroadcastData = 0x4E,
    /// 确认数据
    AcknowledgedData = 0x4F,
    /// 突发数据
    BurstData = 0x50,
    /// 通道 ID（设置或响应）
    ChannelId = 0x51,
    /// 通道状态
    ChannelStatus = 0x52,
    /// 能力信息
    Capabilities = 0x54,
    /// 序列号
    SerialNumber = 0x61,
}

impl MessageId {
    /// 是否为需要按通道号路由的数据/状态类消息
    pub fn is_channel_addressed(self) -> bool {
        matches!(
            self,
            Self::BroadcastData
                | Self::AcknowledgedData
                | Self::BurstData
                | Self::ChannelStatus
                | Self::ChannelId
        )
    }

    /// 是否为仅供参考的设备信息消息
    pub fn is_informational(self) -> bool {
        matches!(self, Self::Version | Self::Capabilities | Self::SerialNumber)
    }
}

// ============================================================================
// 通道事件码
// ============================================================================

/// 通道事件码（通道事件消息的第 3 个数据字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EventCode {
    ResponseNoError = 0x00,
    RxSearchTimeout = 0x01,
    RxFail = 0x02,
    Tx = 0x03,
    TransferRxFailed = 0x04,
    TransferTxCompleted = 0x05,
    TransferTxFailed = 0x06,
    ChannelClosed = 0x07,
    RxFailGoToSearch = 0x08,
    ChannelCollision = 0x09,
}
