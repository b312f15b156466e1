//! 驱动端到端测试（Mock 传输）
//!
//! 运行方式：`cargo test -p antlink-driver --test driver_integration`

use antlink_driver::{
    AntBuilder, DriverContext, DriverError, DriverEvent, DriverState, PipelineConfig,
    RealtimeData, RunLoop, parse_device_profile,
};
use antlink_protocol::{
    AntMessage, ChannelType, EventCode, FrameDecoder, MessageId, RF_EVENT_ID, SensorKind,
    control, sensor,
};
use antlink_transport::{MockHandle, MockTransport, TransportError};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// 解出写到设备的所有消息（填充字节在等待同步时被跳过）
fn sent_messages(handle: &MockHandle) -> Vec<AntMessage> {
    FrameDecoder::new().decode_all(&handle.written())
}

fn assigns(messages: &[AntMessage]) -> Vec<AntMessage> {
    messages
        .iter()
        .filter(|m| m.message_id() == Some(MessageId::AssignChannel))
        .copied()
        .collect()
}

fn ack(channel: u8, command: MessageId) -> AntMessage {
    AntMessage::new(MessageId::ChannelEvent, &[channel, command.into(), 0x00]).unwrap()
}

fn channel_id(channel: u8, device_number: u16, device_code: u8) -> AntMessage {
    let [lo, hi] = device_number.to_le_bytes();
    AntMessage::new(MessageId::ChannelId, &[channel, lo, hi, device_code, 0x01]).unwrap()
}

fn run_loop(profile: &str) -> (RunLoop<MockTransport>, MockHandle, Receiver<DriverEvent>) {
    let (transport, handle) = MockTransport::new();
    let (ctx, events) = DriverContext::new(16);
    let run_loop = RunLoop::new(
        transport,
        parse_device_profile(profile).unwrap(),
        Arc::new(ctx),
        PipelineConfig { idle_sleep_ms: 0 },
    );
    (run_loop, handle, events)
}

fn pump(run_loop: &mut RunLoop<MockTransport>, handle: &MockHandle, msg: &AntMessage) {
    handle.push_rx(&msg.to_bytes());
    while run_loop.poll_once() {}
}

#[test]
fn test_empty_profile_pairs_default_set_in_order() {
    let (mut run_loop, handle, _events) = run_loop("");
    run_loop.startup().unwrap();

    let expected = [
        SensorKind::Power,
        SensorKind::SpeedCadence,
        SensorKind::Cadence,
        SensorKind::HeartRate,
    ];
    for (slot, kind) in expected.into_iter().enumerate() {
        let channel = &run_loop.pool().channels()[slot];
        assert_eq!(channel.channel_type(), ChannelType::from(kind), "slot {}", slot);
        assert_eq!(channel.device_number(), 0);
        assert!(channel.is_searching());
    }

    let messages = sent_messages(&handle);
    assert_eq!(messages[0], control::reset_system());
    assert_eq!(messages[1].message_id(), Some(MessageId::NetworkKey));
    let channels: Vec<usize> = assigns(&messages).iter().map(|m| m.channel()).collect();
    assert_eq!(channels, vec![0, 1, 2, 3]);
}

#[test]
fn test_profile_pairs_listed_devices() {
    let (mut run_loop, handle, _events) = run_loop("12p,45h");
    run_loop.startup().unwrap();

    let pool = run_loop.pool();
    assert_eq!(pool.find_device(12, SensorKind::Power.into()).map(|i| i.get()), Some(0));
    assert_eq!(pool.find_device(45, SensorKind::HeartRate.into()).map(|i| i.get()), Some(1));
    assert!(pool.channels()[2].is_unused());
    assert!(pool.channels()[3].is_unused());
    assert_eq!(pool.used_channels(), 2);

    // 只有两个通道被分配
    assert_eq!(assigns(&sent_messages(&handle)).len(), 2);
}

#[test]
fn test_configuration_handshake_over_transport() {
    let (mut run_loop, handle, _events) = run_loop("12p");
    run_loop.startup().unwrap();
    handle.take_written();

    let power = sensor::lookup_by_kind(SensorKind::Power.into()).unwrap();
    pump(&mut run_loop, &handle, &ack(0, MessageId::AssignChannel));
    pump(&mut run_loop, &handle, &ack(0, MessageId::ChannelId));
    pump(&mut run_loop, &handle, &ack(0, MessageId::SearchTimeout));
    pump(&mut run_loop, &handle, &ack(0, MessageId::ChannelPeriod));
    pump(&mut run_loop, &handle, &ack(0, MessageId::ChannelRfFrequency));

    assert_eq!(
        sent_messages(&handle),
        vec![
            control::set_channel_id(0, 12, power.device_code, 0),
            control::set_search_timeout(0, 4),
            control::set_channel_period(0, power.period),
            control::set_channel_frequency(0, power.frequency),
            control::open_channel(0),
        ]
    );
}

#[test]
fn test_duplicate_profile_entries_share_one_channel() {
    let (mut run_loop, _handle, _events) = run_loop("123p,123p,0p,0p");
    run_loop.startup().unwrap();

    let pool = run_loop.pool();
    assert_eq!(pool.used_channels(), 3);
    assert_eq!(pool.power_channels(), 3);
    assert!(!pool.channels()[0].is_alternate());
    assert!(pool.channels()[1].is_alternate());
    assert!(pool.channels()[2].is_alternate());
}

#[test]
fn test_corrupted_frame_is_skipped() {
    let (mut run_loop, handle, events) = run_loop("45h");
    run_loop.startup().unwrap();

    let mut corrupted = channel_id(0, 999, 0x78).to_bytes();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;
    handle.push_rx(&corrupted);
    pump(&mut run_loop, &handle, &channel_id(0, 45, 0x78));

    let found: Vec<DriverEvent> = events.try_iter().collect();
    assert_eq!(
        found,
        vec![DriverEvent::DeviceFound {
            channel: 0,
            device_number: 45,
            device_type: 0x78,
        }]
    );
    assert!(run_loop.pool().channels()[0].is_identified());
}

#[test]
fn test_driver_open_failure_stops_without_traffic() {
    let (transport, handle) = MockTransport::new();
    handle.fail_next_open();

    let mut driver = AntBuilder::new().build_with_transport(transport);
    driver.start().unwrap();
    let result = driver.join();

    assert!(matches!(
        result,
        Err(DriverError::Transport(TransportError::Device(_)))
    ));
    assert_eq!(driver.state(), DriverState::Stopped);
    assert!(handle.written().is_empty());
    assert!(!handle.is_open());
}

#[test]
fn test_driver_lifecycle() {
    let (transport, handle) = MockTransport::new();
    let mut driver = AntBuilder::new()
        .device_profile("12p,45h")
        .unwrap()
        .build_with_transport(transport);

    assert_eq!(driver.state(), DriverState::Idle);
    assert!(matches!(driver.pause(), Err(DriverError::NotRunning)));

    driver.start().unwrap();
    assert!(matches!(driver.start(), Err(DriverError::AlreadyStarted)));
    assert!(wait_until(|| assigns(&sent_messages(&handle)).len() == 2));

    driver.pause().unwrap();
    assert!(driver.is_paused());
    assert!(driver.is_running());
    assert!(matches!(driver.pause(), Err(DriverError::AlreadyPaused)));

    driver.restart().unwrap();
    assert!(matches!(driver.restart(), Err(DriverError::NotPaused)));

    driver.stop();
    driver.join().unwrap();
    assert_eq!(driver.state(), DriverState::Stopped);
    assert_eq!(handle.close_count(), 1);
    assert!(matches!(driver.start(), Err(DriverError::AlreadyStarted)));
}

#[test]
fn test_paused_driver_keeps_reading() {
    let (transport, handle) = MockTransport::new();
    let mut driver = AntBuilder::new()
        .device_profile("45h")
        .unwrap()
        .build_with_transport(transport);
    driver.start().unwrap();
    assert!(wait_until(|| handle.is_open()));
    driver.pause().unwrap();

    handle.push_rx(&channel_id(0, 45, 0x78).to_bytes());
    let event = driver.events().recv_timeout(WAIT).unwrap();
    assert_eq!(
        event,
        DriverEvent::DeviceFound {
            channel: 0,
            device_number: 45,
            device_type: 0x78,
        }
    );
    driver.stop();
    driver.join().unwrap();
}

#[test]
fn test_events_and_realtime_data() {
    let (transport, handle) = MockTransport::new();
    let mut driver = AntBuilder::new().build_with_transport(transport);
    driver.start().unwrap();
    assert!(wait_until(|| assigns(&sent_messages(&handle)).len() == 4));

    // 默认配对中通道 3 是心率
    handle.push_rx(&channel_id(3, 777, 0x78).to_bytes());
    handle.push_rx(
        &AntMessage::new(MessageId::BroadcastData, &[3, 0, 0, 0, 0, 0, 0, 0, 128])
            .unwrap()
            .to_bytes(),
    );
    // 通道 1 快速搜索超时
    handle.push_rx(
        &AntMessage::new(
            MessageId::ChannelEvent,
            &[1, RF_EVENT_ID, EventCode::RxSearchTimeout.into()],
        )
        .unwrap()
        .to_bytes(),
    );

    assert_eq!(
        driver.events().recv_timeout(WAIT).unwrap(),
        DriverEvent::DeviceFound {
            channel: 3,
            device_number: 777,
            device_type: 0x78,
        }
    );
    assert_eq!(
        driver.events().recv_timeout(WAIT).unwrap(),
        DriverEvent::SearchTimeout { channel: 1 }
    );

    let mut rt = RealtimeData {
        mode: 3,
        load: 200.0,
        slope: 2.0,
        ..Default::default()
    };
    assert!(wait_until(|| {
        driver.get_realtime_data(&mut rt);
        rt.heart_rate == 128
    }));
    assert_eq!(rt.mode, 3);
    assert_eq!(rt.load, 200.0);
    assert_eq!(rt.slope, 2.0);

    drop(driver);
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_debug_capture_records_received_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("antlog.bin");
    std::fs::write(&path, b"stale contents").unwrap();

    let (transport, handle) = MockTransport::new();
    let mut driver = AntBuilder::new()
        .device_profile("45h")
        .unwrap()
        .debug_capture(Some(&path))
        .build_with_transport(transport);
    driver.start().unwrap();

    handle.push_rx(&channel_id(0, 45, 0x78).to_bytes());
    driver.events().recv_timeout(WAIT).unwrap();
    drop(driver);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes, channel_id(0, 45, 0x78).to_capture_record());
}

#[test]
fn test_open_failure_keeps_previous_capture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("antlog.bin");
    std::fs::write(&path, b"previous run").unwrap();

    let (transport, handle) = MockTransport::new();
    handle.fail_next_open();
    let mut driver = AntBuilder::new()
        .debug_capture(Some(&path))
        .build_with_transport(transport);
    driver.start().unwrap();
    assert!(driver.join().is_err());
    drop(driver);

    assert_eq!(std::fs::read(&path).unwrap(), b"previous run");
}
