//! 遥测数据
//!
//! run-loop 是唯一写者，通过 `ArcSwap` 发布快照；控制方随时无锁读取。
//! 这里只做把读数路由到 `RealtimeData` 所需的最小解码。

use antlink_protocol::SensorKind;

/// 轮周长（米）
pub const WHEEL_CIRCUMFERENCE_M: f64 = 2.1;

/// 复合功率计厂商 ID
pub const QUARQ_MANUFACTURER_ID: u16 = 7;

/// 低于此主软件版本的复合功率计使用旧协议（需要单独的控制通道）
pub const LEGACY_SOFTWARE_REVISION: u8 = 18;

/// 标准功率数据页
pub const PAGE_STANDARD_POWER: u8 = 0x10;
/// 通用数据页：厂商信息
pub const PAGE_MANUFACTURER_INFO: u8 = 0x50;
/// 通用数据页：产品信息
pub const PAGE_PRODUCT_INFO: u8 = 0x51;

/// 事件时间单位（1/1024 秒）
const EVENT_TIME_TICKS_PER_SEC: f64 = 1024.0;

/// 无效踏频标记
const CADENCE_INVALID: u8 = 0xFF;

/// 实时数据快照
///
/// `mode`、`load`、`slope` 属于控制方，驱动从不写入它们。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RealtimeData {
    /// 心率（bpm）
    pub heart_rate: u8,
    /// 功率（W）
    pub power: u16,
    /// 第二个功率计的功率（W）
    pub alt_power: u16,
    /// 踏频（rpm）
    pub cadence: f64,
    /// 轮速（rpm）
    pub wheel_rpm: f64,
    /// 速度（km/h）
    pub speed_kph: f64,
    pub mode: u8,
    pub load: f64,
    pub slope: f64,
}

impl RealtimeData {
    /// 复制传感器读数，保留自己的 mode/load/slope
    pub fn copy_readings_from(&mut self, other: &RealtimeData) {
        self.heart_rate = other.heart_rate;
        self.power = other.power;
        self.alt_power = other.alt_power;
        self.cadence = other.cadence;
        self.wheel_rpm = other.wheel_rpm;
        self.speed_kph = other.speed_kph;
    }

    /// 应用一条读数
    pub fn apply(&mut self, reading: Reading) {
        match reading {
            Reading::HeartRate(bpm) => self.heart_rate = bpm,
            Reading::Power {
                watts,
                cadence,
                alternate,
            } => {
                if alternate {
                    self.alt_power = watts;
                } else {
                    self.power = watts;
                }
                if let Some(rpm) = cadence {
                    self.cadence = f64::from(rpm);
                }
            },
            Reading::Cadence(rpm) => self.cadence = rpm,
            Reading::WheelRpm(rpm) => {
                self.wheel_rpm = rpm;
                self.speed_kph = wheel_rpm_to_kph(rpm);
            },
        }
    }

    /// 数据过期时清零对应传感器的读数
    pub fn clear(&mut self, kind: SensorKind, alternate: bool) {
        match kind {
            SensorKind::HeartRate => self.heart_rate = 0,
            SensorKind::Power => {
                if alternate {
                    self.alt_power = 0;
                } else {
                    self.power = 0;
                    self.cadence = 0.0;
                }
            },
            SensorKind::Speed => {
                self.wheel_rpm = 0.0;
                self.speed_kph = 0.0;
            },
            SensorKind::Cadence => self.cadence = 0.0,
            SensorKind::SpeedCadence => {
                self.wheel_rpm = 0.0;
                self.speed_kph = 0.0;
                self.cadence = 0.0;
            },
            // 复合功率计的现代协议通道不产生读数
            SensorKind::Quarq | SensorKind::FastQuarq | SensorKind::FastQuarqNew => {},
        }
    }
}

/// 单条解码读数
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    HeartRate(u8),
    Power {
        watts: u16,
        cadence: Option<u8>,
        alternate: bool,
    },
    Cadence(f64),
    WheelRpm(f64),
}

/// 轮速换算为速度
pub fn wheel_rpm_to_kph(rpm: f64) -> f64 {
    rpm * WHEEL_CIRCUMFERENCE_M * 60.0 / 1000.0
}

/// 数据消息的 8 字节有效载荷（去掉通道号）
pub type Payload = [u8; 8];

/// 心率：第 8 个载荷字节（所有数据页相同）
pub fn decode_heart_rate(payload: &Payload) -> u8 {
    payload[7]
}

/// 标准功率页：返回（瞬时功率，踏频）
pub fn decode_standard_power(payload: &Payload) -> Option<(u16, Option<u8>)> {
    if payload[0] != PAGE_STANDARD_POWER {
        return None;
    }
    let watts = u16::from_le_bytes([payload[6], payload[7]]);
    let cadence = (payload[3] != CADENCE_INVALID).then_some(payload[3]);
    Some((watts, cadence))
}

/// 通用数据页
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonPage {
    Manufacturer {
        hw_revision: u8,
        manufacturer_id: u16,
        model: u16,
    },
    Product {
        sw_revision: u8,
        serial: u32,
    },
}

pub fn decode_common_page(payload: &Payload) -> Option<CommonPage> {
    match payload[0] {
        PAGE_MANUFACTURER_INFO => Some(CommonPage::Manufacturer {
            hw_revision: payload[3],
            manufacturer_id: u16::from_le_bytes([payload[4], payload[5]]),
            model: u16::from_le_bytes([payload[6], payload[7]]),
        }),
        PAGE_PRODUCT_INFO => Some(CommonPage::Product {
            sw_revision: payload[3],
            serial: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
        }),
        _ => None,
    }
}

/// 事件时间 + 累计转数（均为 16 位回绕计数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevolutionSample {
    pub event_time: u16,
    pub revolutions: u16,
}

impl RevolutionSample {
    /// 从载荷的 `offset` 处读取（时间在前，转数在后，小端）
    pub fn read(payload: &Payload, offset: usize) -> Self {
        Self {
            event_time: u16::from_le_bytes([payload[offset], payload[offset + 1]]),
            revolutions: u16::from_le_bytes([payload[offset + 2], payload[offset + 3]]),
        }
    }
}

/// 转速计算（相邻两次事件的差分）
#[derive(Debug, Clone, Copy, Default)]
pub struct RevolutionTracker {
    last: Option<RevolutionSample>,
}

impl RevolutionTracker {
    /// 记录新样本，事件时间推进时返回转速（rpm）
    pub fn update(&mut self, sample: RevolutionSample) -> Option<f64> {
        let previous = self.last.replace(sample)?;
        let ticks = sample.event_time.wrapping_sub(previous.event_time);
        if ticks == 0 {
            return None;
        }
        let revolutions = sample.revolutions.wrapping_sub(previous.revolutions);
        Some(f64::from(revolutions) * 60.0 * EVENT_TIME_TICKS_PER_SEC / f64::from(ticks))
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
