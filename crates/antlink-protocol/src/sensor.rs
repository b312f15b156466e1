//! 传感器类型表
//!
//! 将传感器类别映射到协议参数（广播周期、设备类型码、射频频率、网络号），
//! 以及配置字符串中使用的单字符后缀。纯查表，无状态。

use crate::ids::{ANT_SPORT_NETWORK_NUMBER, DEFAULT_NETWORK_NUMBER};

/// 找不到类别时返回的后缀
pub const UNKNOWN_SUFFIX: char = '-';

/// 找不到设备类型码时返回的描述
pub const UNKNOWN_DEVICE_DESCRIPTION: &str = "Unknown device type";

/// 传感器类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorKind {
    HeartRate,
    Power,
    Speed,
    Cadence,
    SpeedCadence,
    /// 复合功率计的现代协议（慢速控制通道）
    Quarq,
    /// 复合功率计的现代协议（快速通道）
    FastQuarq,
    /// 复合功率计的现代协议（快速通道，新版设备类型码）
    FastQuarqNew,
}

impl SensorKind {
    /// 是否属于复合功率计的现代协议族
    pub fn is_composite_family(self) -> bool {
        matches!(self, Self::Quarq | Self::FastQuarq | Self::FastQuarqNew)
    }

    /// 复合功率计现代协议族，按查找优先级排列
    pub const COMPOSITE_FAMILY: [SensorKind; 3] =
        [SensorKind::Quarq, SensorKind::FastQuarq, SensorKind::FastQuarqNew];
}

/// 通道槽位类型
///
/// `Unused` 是显式变体，不再借用魔法常量表示空闲槽位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelType {
    #[default]
    Unused,
    Sensor(SensorKind),
}

impl ChannelType {
    pub fn is_unused(self) -> bool {
        self == Self::Unused
    }

    pub fn kind(self) -> Option<SensorKind> {
        match self {
            Self::Unused => None,
            Self::Sensor(kind) => Some(kind),
        }
    }
}

impl From<SensorKind> for ChannelType {
    fn from(kind: SensorKind) -> Self {
        Self::Sensor(kind)
    }
}

/// 传感器类型描述（不可变，编译期定义）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorType {
    pub channel_type: ChannelType,
    /// 广播周期（1/32768 秒）
    pub period: u16,
    /// 协议设备类型码
    pub device_code: u8,
    /// 射频频率（2400MHz + freq）
    pub frequency: u8,
    pub network: u8,
    pub name: &'static str,
    pub suffix: char,
}

const SPORT_FREQUENCY: u8 = 57;
const QUARQ_FREQUENCY: u8 = 61;
const POWER_PERIOD: u16 = 8182;

/// 传感器类型表
pub const SENSOR_TYPES: [SensorType; 9] = [
    SensorType {
        channel_type: ChannelType::Unused,
        period: 0,
        device_code: 0,
        frequency: 0,
        network: 0,
        name: "Unused",
        suffix: '?',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::HeartRate),
        period: 8070,
        device_code: 0x78,
        frequency: SPORT_FREQUENCY,
        network: ANT_SPORT_NETWORK_NUMBER,
        name: "Heartrate",
        suffix: 'h',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::Power),
        period: POWER_PERIOD,
        device_code: 0x0B,
        frequency: SPORT_FREQUENCY,
        network: ANT_SPORT_NETWORK_NUMBER,
        name: "Power",
        suffix: 'p',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::Speed),
        period: 8118,
        device_code: 0x7B,
        frequency: SPORT_FREQUENCY,
        network: ANT_SPORT_NETWORK_NUMBER,
        name: "Speed",
        suffix: 's',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::Cadence),
        period: 8102,
        device_code: 0x7A,
        frequency: SPORT_FREQUENCY,
        network: ANT_SPORT_NETWORK_NUMBER,
        name: "Cadence",
        suffix: 'c',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::SpeedCadence),
        period: 8086,
        device_code: 0x79,
        frequency: SPORT_FREQUENCY,
        network: ANT_SPORT_NETWORK_NUMBER,
        name: "Speed + Cadence",
        suffix: 'd',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::Quarq),
        period: POWER_PERIOD * 4,
        device_code: 0x60,
        frequency: QUARQ_FREQUENCY,
        network: DEFAULT_NETWORK_NUMBER,
        name: "Quarq Channel",
        suffix: 'Q',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::FastQuarq),
        period: POWER_PERIOD / 16,
        device_code: 0x60,
        frequency: QUARQ_FREQUENCY,
        network: DEFAULT_NETWORK_NUMBER,
        name: "Fast Quarq",
        suffix: 'q',
    },
    SensorType {
        channel_type: ChannelType::Sensor(SensorKind::FastQuarqNew),
        period: POWER_PERIOD / 16,
        // 1.8 版本之前的固件使用功率计类型码
        device_code: 0x0B,
        frequency: QUARQ_FREQUENCY,
        network: DEFAULT_NETWORK_NUMBER,
        name: "Fast Quarq New",
        suffix: 'n',
    },
];

/// 按后缀查找类别（'p' -> Power）
pub fn lookup_by_suffix(suffix: char) -> Option<ChannelType> {
    SENSOR_TYPES
        .iter()
        .find(|st| st.suffix == suffix)
        .map(|st| st.channel_type)
}

/// 按类别查找表项
pub fn lookup_by_kind(channel_type: ChannelType) -> Option<&'static SensorType> {
    SENSOR_TYPES.iter().find(|st| st.channel_type == channel_type)
}

/// 类别对应的后缀，未知时返回 `'-'`
pub fn suffix_for(channel_type: ChannelType) -> char {
    lookup_by_kind(channel_type).map_or(UNKNOWN_SUFFIX, |st| st.suffix)
}

/// 类别对应的显示名称，未知时返回 "Unknown device type"
pub fn name_for(channel_type: ChannelType) -> &'static str {
    lookup_by_kind(channel_type).map_or(UNKNOWN_DEVICE_DESCRIPTION, |st| st.name)
}

/// 按传感器上报的设备类型码查找后缀
///
/// 多个类别共享同一类型码时返回表中第一个匹配项。
pub fn suffix_for_device_code(device_code: u8) -> char {
    SENSOR_TYPES
        .iter()
        .find(|st| st.device_code == device_code)
        .map_or(UNKNOWN_SUFFIX, |st| st.suffix)
}

/// 按设备类型码查找描述
pub fn description_for_device_code(device_code: u8) -> &'static str {
    SENSOR_TYPES
        .iter()
        .find(|st| st.device_code == device_code)
        .map_or(UNKNOWN_DEVICE_DESCRIPTION, |st| st.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_round_trip() {
        for st in SENSOR_TYPES.iter() {
            let channel_type = lookup_by_suffix(st.suffix).unwrap();
            assert_eq!(suffix_for(channel_type), st.suffix, "row {}", st.name);
        }
    }

    #[test]
    fn test_unknown_lookups() {
        assert_eq!(lookup_by_suffix('x'), None);
        assert_eq!(lookup_by_suffix('\0'), None);
        assert_eq!(suffix_for_device_code(0xEE), '-');
        assert_eq!(description_for_device_code(0xEE), "Unknown device type");
    }

    #[test]
    fn test_device_code_first_match_wins() {
        // 0x0B 同时属于 Power 和 FastQuarqNew
        assert_eq!(suffix_for_device_code(0x0B), 'p');
        assert_eq!(description_for_device_code(0x78), "Heartrate");
    }

    #[test]
    fn test_protocol_parameters() {
        let hr = lookup_by_kind(SensorKind::HeartRate.into()).unwrap();
        assert_eq!(hr.period, 8070);
        assert_eq!(hr.frequency, 57);
        assert_eq!(hr.network, 1);

        let quarq = lookup_by_kind(SensorKind::Quarq.into()).unwrap();
        assert_eq!(quarq.period, 8182 * 4);
        assert_eq!(quarq.network, 0);
        assert_eq!(name_for(SensorKind::SpeedCadence.into()), "Speed + Cadence");
    }

    #[test]
    fn test_composite_family() {
        assert!(SensorKind::FastQuarqNew.is_composite_family());
        assert!(!SensorKind::Power.is_composite_family());
        assert!(ChannelType::default().is_unused());
    }
}
