//! 命令行参数
//!
//! 先读配置文件（可选），再用命令行参数覆盖。

use anyhow::{Context, Result};
use antlink_driver::DriverConfig;
use antlink_transport::TransportKind;
use clap::Parser;
use std::path::PathBuf;

/// ANT+ 传感器监视器
///
/// 打开 ANT USB 棒（或串口适配器），配对传感器并持续打印事件和遥测，Ctrl+C 退出
#[derive(Parser, Debug)]
#[command(name = "antlink-cli")]
#[command(about = "Pair ANT+ cycling sensors and print their telemetry", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML 配置文件
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 串口设备（覆盖配置）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 后端：auto | usb | serial
    #[arg(short, long)]
    pub transport: Option<TransportKind>,

    /// 串口波特率
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// 配对列表，如 "12p,45h"；传空字符串表示自动配对
    #[arg(short, long)]
    pub devices: Option<String>,

    /// 调试录制文件
    #[arg(long, conflicts_with = "no_capture")]
    pub capture: Option<PathBuf>,

    /// 关闭调试录制
    #[arg(long)]
    pub no_capture: bool,

    /// 遥测打印间隔（毫秒）
    #[arg(short, long, default_value_t = 1000)]
    pub interval: u64,
}

impl Cli {
    /// 合并配置文件与命令行覆盖项
    pub fn driver_config(&self) -> Result<DriverConfig> {
        let mut config = match &self.config {
            Some(path) => DriverConfig::load(path)
                .with_context(|| format!("加载配置失败: {}", path.display()))?,
            None => DriverConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(kind) = self.transport {
            config.transport = kind;
        }
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if let Some(devices) = &self.devices {
            config.devices = devices.clone();
        }
        if self.no_capture {
            config.debug_capture = None;
        } else if let Some(path) = &self.capture {
            config.debug_capture = Some(path.clone());
        }

        config.validate().context("配置无效")?;
        Ok(config)
    }
}
