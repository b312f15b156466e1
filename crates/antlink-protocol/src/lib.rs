//! # ANT Link Protocol
//!
//! ANT+ 串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 同步字节、消息 ID、事件码常量
//! - `sensor`: 传感器类型表
//! - `control`: 驱动发出的命令消息构建
//! - `decoder`: 逐字节帧解码状态机
//!
//! ## 帧格式
//!
//! ```text
//! SYNC(1) | LEN(1) | MSG_ID(1) | DATA(LEN) | CHECKSUM(1)
//! ```
//!
//! 校验和为 SYNC 到最后一个数据字节的逐字节异或。多字节字段为小端序。

pub mod control;
pub mod decoder;
pub mod ids;
pub mod sensor;

// 重新导出常用类型
pub use control::*;
pub use decoder::FrameDecoder;
pub use ids::*;
pub use sensor::{ChannelType, SensorKind, SensorType};

use thiserror::Error;

/// 已校验的协议消息
///
/// # 设计特性
///
/// - **Copy trait**：固定 9 字节数据区，无堆分配
/// - 只在校验和通过后由 `FrameDecoder` 产生，或由 `control` 构建器构造
/// - 生命周期仅限一次分发
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AntMessage {
    /// 消息 ID
    pub id: u8,
    /// 有效数据长度 (1-9)
    pub len: u8,
    /// 数据区（未使用部分为 0）
    pub data: [u8; MAX_DATA_LENGTH],
}

impl AntMessage {
    /// 构造消息
    ///
    /// # 错误
    /// - 数据为空或超过 9 字节时返回 `ProtocolError::InvalidLength`
    pub fn new(id: impl Into<u8>, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.is_empty() || payload.len() > MAX_DATA_LENGTH {
            return Err(ProtocolError::InvalidLength {
                max: MAX_DATA_LENGTH,
                actual: payload.len(),
            });
        }

        let mut data = [0u8; MAX_DATA_LENGTH];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            id: id.into(),
            len: payload.len() as u8,
            data,
        })
    }

    /// 获取有效数据切片
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 解析消息 ID（未知 ID 返回 None）
    pub fn message_id(&self) -> Option<MessageId> {
        MessageId::try_from(self.id).ok()
    }

    /// 目标通道号（第一个数据字节的低 3 位）
    pub fn channel(&self) -> usize {
        (self.data[0] & 0x07) as usize
    }

    /// 通道事件子 ID（0x01 表示射频事件，否则为被响应的命令 ID）
    pub fn event_message_id(&self) -> u8 {
        self.data[1]
    }

    /// 通道事件码
    pub fn event_code(&self) -> u8 {
        self.data[2]
    }

    /// 是否为射频事件（而非命令响应）
    pub fn is_rf_event(&self) -> bool {
        self.data[1] == RF_EVENT_ID
    }

    /// 计算校验和（SYNC ^ LEN ^ ID ^ DATA...）
    pub fn checksum(&self) -> u8 {
        self.data_slice()
            .iter()
            .fold(SYNC_BYTE ^ self.len ^ self.id, |acc, b| acc ^ b)
    }

    /// 编码为线上字节
    ///
    /// 返回固定大小缓冲区和有效长度。
    pub fn encode(&self) -> ([u8; MAX_MESSAGE_SIZE], usize) {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let len = self.len as usize;
        buf[0] = SYNC_BYTE;
        buf[1] = self.len;
        buf[2] = self.id;
        buf[3..3 + len].copy_from_slice(self.data_slice());
        buf[3 + len] = self.checksum();
        (buf, len + 4)
    }

    /// 编码为 Vec（测试和日志使用）
    pub fn to_bytes(&self) -> Vec<u8> {
        let (buf, len) = self.encode();
        buf[..len].to_vec()
    }

    /// 调试录制记录（固定 13 字节，不足部分补 0）
    pub fn to_capture_record(&self) -> [u8; MAX_MESSAGE_SIZE] {
        self.encode().0
    }
}

/// 协议错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid payload length: max {max}, got {actual}")]
    InvalidLength { max: usize, actual: usize },
}
