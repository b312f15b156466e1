//! 帧解码状态机
//!
//! 逐字节将原始字节流切分为经过校验的消息。每个字节只做 O(1) 的工作，不回溯：
//! 长度非法或校验失败时静默丢弃当前帧，在下一个同步字节处重新同步。

use crate::AntMessage;
use crate::ids::{MAX_DATA_LENGTH, SYNC_BYTE};

/// 解码器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    #[default]
    WaitForSync,
    GetLength,
    GetMessageId,
    GetData,
    ValidatePacket,
}

/// 帧解码器
///
/// # Example
///
/// ```
/// use antlink_protocol::{FrameDecoder, control};
///
/// let mut decoder = FrameDecoder::new();
/// let bytes = control::open_channel(1).to_bytes();
/// let frames: Vec<_> = bytes.iter().filter_map(|b| decoder.push(*b)).collect();
/// assert_eq!(frames, vec![control::open_channel(1)]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    state: DecoderState,
    checksum: u8,
    length: u8,
    id: u8,
    received: usize,
    data: [u8; MAX_DATA_LENGTH],
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 丢弃正在解码的帧，回到等待同步状态
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 输入一个字节，帧完整且校验通过时返回消息
    pub fn push(&mut self, byte: u8) -> Option<AntMessage> {
        match self.state {
            DecoderState::WaitForSync => {
                if byte == SYNC_BYTE {
                    self.checksum = SYNC_BYTE;
                    self.state = DecoderState::GetLength;
                }
            },
            DecoderState::GetLength => {
                if byte == 0 || byte as usize > MAX_DATA_LENGTH {
                    self.state = DecoderState::WaitForSync;
                } else {
                    self.length = byte;
                    self.checksum ^= byte;
                    self.received = 0;
                    self.data = [0; MAX_DATA_LENGTH];
                    self.state = DecoderState::GetMessageId;
                }
            },
            DecoderState::GetMessageId => {
                self.id = byte;
                self.checksum ^= byte;
                self.state = DecoderState::GetData;
            },
            DecoderState::GetData => {
                self.data[self.received] = byte;
                self.checksum ^= byte;
                self.received += 1;
                if self.received >= self.length as usize {
                    self.state = DecoderState::ValidatePacket;
                }
            },
            DecoderState::ValidatePacket => {
                self.state = DecoderState::WaitForSync;
                if byte == self.checksum {
                    return Some(AntMessage {
                        id: self.id,
                        len: self.length,
                        data: self.data,
                    });
                }
            },
        }
        None
    }

    /// 整块输入，返回其中所有完整帧
    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<AntMessage> {
        bytes.iter().filter_map(|b| self.push(*b)).collect()
    }
}
