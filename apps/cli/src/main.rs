//! # antlink CLI
//!
//! 配对 ANT+ 骑行传感器并持续打印事件与遥测。
//!
//! ```bash
//! # 自动配对（功率、速度踏频、踏频、心率）
//! antlink-cli
//!
//! # 指定设备，使用配置文件
//! antlink-cli --config antlink.toml --devices 12p,45h
//! ```
//!
//! 日志级别通过 `RUST_LOG` 调整，默认 `antlink=info`。

use anyhow::{Context, Result};
use antlink_driver::{AntBuilder, RealtimeData};
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod args;
mod monitor;

use args::Cli;

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("antlink=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.driver_config()?;

    info!(
        "Using {} transport on {} ({} baud), devices: {}",
        config.transport,
        config.port,
        config.baud,
        if config.devices.is_empty() { "auto" } else { config.devices.as_str() }
    );

    let mut driver = AntBuilder::from_config(&config)?
        .build()
        .context("打开 ANT 设备失败")?;

    // Ctrl+C 只置位，由主循环负责停止驱动
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    driver.start()?;
    eprintln!("antlink started. Press Ctrl+C to stop.");

    let interval = Duration::from_millis(cli.interval.max(10));
    let mut rt = RealtimeData::default();
    let mut last_report = Instant::now();

    while !interrupted.load(Ordering::SeqCst) && driver.is_running() {
        if let Ok(event) = driver.events().recv_timeout(interval) {
            println!("{}", monitor::format_event(&event));
        }

        if last_report.elapsed() >= interval {
            driver.get_realtime_data(&mut rt);
            println!("{}", monitor::format_telemetry(&rt));
            last_report = Instant::now();
        }
    }

    driver.stop();
    driver.join()?;

    let dropped = driver.dropped_events();
    if dropped > 0 {
        info!("{} events were dropped because the queue was full", dropped);
    }
    Ok(())
}
