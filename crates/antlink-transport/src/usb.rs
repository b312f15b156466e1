//! USB Bulk 后端
//!
//! 支持 Dynastream ANT USB 接收棒（USB2 / USB-m）。USB 一次 Bulk IN 可能携带多个字节，
//! 这里缓存后逐字节交给上层。

use crate::{Transport, TransportDeviceError, TransportDeviceErrorKind, TransportError};
use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Dynastream Innovations
pub const ANT_USB_VENDOR_ID: u16 = 0x0FCF;

/// 支持的产品 ID（USB2 Stick、USB-m Stick）
pub const ANT_USB_PRODUCT_IDS: [u16; 2] = [0x1008, 0x1009];

const INTERFACE: u8 = 0;
const READ_TIMEOUT: Duration = Duration::from_millis(10);
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
const BULK_PACKET_SIZE: usize = 64;

/// USB 传输
pub struct UsbTransport {
    handle: Option<DeviceHandle<GlobalContext>>,
    endpoint_in: u8,
    endpoint_out: u8,
    kernel_driver_detached: bool,
    /// 接收缓存：Bulk 包中尚未交给上层的字节
    rx_queue: VecDeque<u8>,
}

impl UsbTransport {
    pub fn new() -> Self {
        Self {
            handle: None,
            endpoint_in: 0,
            endpoint_out: 0,
            kernel_driver_detached: false,
            rx_queue: VecDeque::new(),
        }
    }

    /// 是否插着受支持的 USB 棒
    pub fn is_present() -> bool {
        let Ok(devices) = rusb::devices() else {
            return false;
        };
        devices.iter().any(|device| {
            device.device_descriptor().is_ok_and(|desc| {
                desc.vendor_id() == ANT_USB_VENDOR_ID
                    && ANT_USB_PRODUCT_IDS.contains(&desc.product_id())
            })
        })
    }

    fn open_handle() -> Option<DeviceHandle<GlobalContext>> {
        ANT_USB_PRODUCT_IDS
            .iter()
            .find_map(|pid| rusb::open_device_with_vid_pid(ANT_USB_VENDOR_ID, *pid))
    }

    /// 查找 Bulk IN/OUT 端点
    fn find_bulk_endpoints(handle: &DeviceHandle<GlobalContext>) -> Option<(u8, u8)> {
        let config = handle.device().config_descriptor(0).ok()?;
        let mut endpoint_in = None;
        let mut endpoint_out = None;

        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }
                    match endpoint.direction() {
                        Direction::In => endpoint_in = endpoint_in.or(Some(endpoint.address())),
                        Direction::Out => endpoint_out = endpoint_out.or(Some(endpoint.address())),
                    }
                }
            }
        }

        Some((endpoint_in?, endpoint_out?))
    }
}

impl Default for UsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn usb_error(context: &str, e: rusb::Error) -> TransportError {
    let kind = match e {
        rusb::Error::NoDevice | rusb::Error::NotFound => TransportDeviceErrorKind::NotFound,
        rusb::Error::Access => TransportDeviceErrorKind::AccessDenied,
        rusb::Error::Busy => TransportDeviceErrorKind::Busy,
        _ => TransportDeviceErrorKind::Backend,
    };
    TransportError::Device(TransportDeviceError::new(kind, format!("{}: {}", context, e)))
}

impl Transport for UsbTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let mut handle = Self::open_handle().ok_or_else(|| {
            TransportError::Device(TransportDeviceError::new(
                TransportDeviceErrorKind::NotFound,
                "No ANT USB stick found",
            ))
        })?;

        // Linux 上 usb_serial_simple 可能已经接管了设备
        if handle.kernel_driver_active(INTERFACE).unwrap_or(false) {
            handle
                .detach_kernel_driver(INTERFACE)
                .map_err(|e| usb_error("detach kernel driver", e))?;
            self.kernel_driver_detached = true;
        }

        handle
            .claim_interface(INTERFACE)
            .map_err(|e| usb_error("claim interface", e))?;

        let (endpoint_in, endpoint_out) = Self::find_bulk_endpoints(&handle).ok_or_else(|| {
            TransportError::Device(TransportDeviceError::new(
                TransportDeviceErrorKind::UnsupportedConfig,
                "ANT USB stick has no bulk endpoints",
            ))
        })?;

        debug!(
            "ANT USB stick opened (in=0x{:02X}, out=0x{:02X})",
            endpoint_in, endpoint_out
        );
        self.endpoint_in = endpoint_in;
        self.endpoint_out = endpoint_out;
        self.rx_queue.clear();
        self.handle = Some(handle);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.rx_queue.is_empty() {
            let handle = self.handle.as_ref().ok_or(TransportError::NotOpen)?;
            let mut packet = [0u8; BULK_PACKET_SIZE];
            match handle.read_bulk(self.endpoint_in, &mut packet, READ_TIMEOUT) {
                Ok(n) => {
                    trace!("usb bulk in: {} bytes", n);
                    self.rx_queue.extend(&packet[..n]);
                },
                Err(rusb::Error::Timeout) => return Ok(0),
                Err(e) => return Err(usb_error("bulk read", e)),
            }
        }

        let n = buf.len().min(self.rx_queue.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let handle = self.handle.as_ref().ok_or(TransportError::NotOpen)?;
        match handle.write_bulk(self.endpoint_out, bytes, WRITE_TIMEOUT) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Err(TransportError::Timeout),
            Err(e) => Err(usb_error("bulk write", e)),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.release_interface(INTERFACE) {
                warn!("Failed to release ANT USB interface: {}", e);
            }
            if self.kernel_driver_detached {
                let _ = handle.attach_kernel_driver(INTERFACE);
                self.kernel_driver_detached = false;
            }
        }
        self.rx_queue.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "usb:ant-stick".to_string()
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
