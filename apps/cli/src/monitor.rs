//! 事件与遥测的文本输出

use antlink_driver::{DriverEvent, RealtimeData};
use antlink_protocol::sensor;

pub fn format_event(event: &DriverEvent) -> String {
    match *event {
        DriverEvent::DeviceFound {
            channel,
            device_number,
            device_type,
        } => format!(
            "📡 通道 {}: 发现 {} #{} ({}{})",
            channel,
            sensor::description_for_device_code(device_type),
            device_number,
            device_number,
            sensor::suffix_for_device_code(device_type),
        ),
        DriverEvent::DeviceLost { channel } => format!("⚠️  通道 {}: 设备丢失", channel),
        DriverEvent::SearchTimeout { channel } => {
            format!("⏱️  通道 {}: 快速搜索超时，转入后台搜索", channel)
        },
    }
}

/// 单行遥测摘要
pub fn format_telemetry(rt: &RealtimeData) -> String {
    let mut line = format!(
        "HR {:>3} bpm | Power {:>4} W | Cadence {:>5.1} rpm | Speed {:>5.1} km/h",
        rt.heart_rate, rt.power, rt.cadence, rt.speed_kph
    );
    if rt.alt_power != 0 {
        line.push_str(&format!(" | Alt power {:>4} W", rt.alt_power));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_device_found() {
        let text = format_event(&DriverEvent::DeviceFound {
            channel: 1,
            device_number: 45,
            device_type: 0x78,
        });
        assert!(text.contains("通道 1"));
        assert!(text.contains("45h"));
    }

    #[test]
    fn test_format_telemetry_hides_idle_alternate_power() {
        let rt = RealtimeData {
            heart_rate: 128,
            power: 250,
            ..Default::default()
        };
        let line = format_telemetry(&rt);
        assert!(line.contains("128 bpm"));
        assert!(line.contains(" 250 W"));
        assert!(!line.contains("Alt power"));

        let rt = RealtimeData {
            alt_power: 180,
            ..rt
        };
        assert!(format_telemetry(&rt).contains("Alt power  180 W"));
    }
}
