//! 串口后端
//!
//! 通过 termios 将 tty 配置为原始模式：非阻塞、无控制终端、8N1、硬件流控、
//! VMIN=0/VTIME=0。

use crate::{Transport, TransportDeviceError, TransportDeviceErrorKind, TransportError};
use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices,
};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use tracing::{debug, trace, warn};

/// 串口传输
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    file: Option<File>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            file: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn baud(&self) -> Result<BaudRate, TransportError> {
        let baud = match self.baud_rate {
            9_600 => BaudRate::B9600,
            19_200 => BaudRate::B19200,
            38_400 => BaudRate::B38400,
            57_600 => BaudRate::B57600,
            115_200 => BaudRate::B115200,
            230_400 => BaudRate::B230400,
            other => {
                return Err(TransportError::Device(TransportDeviceError::new(
                    TransportDeviceErrorKind::UnsupportedConfig,
                    format!("unsupported baud rate: {}", other),
                )));
            },
        };
        Ok(baud)
    }

    fn configure(&self, file: &File) -> Result<(), TransportError> {
        // 清掉打开前残留的数据
        termios::tcflush(file, FlushArg::TCIOFLUSH).map_err(nix_error)?;

        let mut settings = termios::tcgetattr(file).map_err(nix_error)?;
        termios::cfmakeraw(&mut settings);
        termios::cfsetspeed(&mut settings, self.baud()?).map_err(nix_error)?;

        settings.input_flags = InputFlags::IGNPAR;
        settings.output_flags = OutputFlags::empty();
        settings.control_flags &= !(ControlFlags::CSIZE | ControlFlags::CSTOPB);
        settings.control_flags |=
            ControlFlags::CS8 | ControlFlags::CREAD | ControlFlags::HUPCL | ControlFlags::CRTSCTS;
        settings.local_flags = LocalFlags::empty();
        settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        termios::tcsetattr(file, SetArg::TCSANOW, &settings).map_err(nix_error)?;
        Ok(())
    }
}

fn nix_error(errno: nix::errno::Errno) -> TransportError {
    TransportError::Io(std::io::Error::from(errno))
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TransportError::Device(TransportDeviceError::new(
                    TransportDeviceErrorKind::NotFound,
                    format!("serial port {} not found", self.path),
                )),
                ErrorKind::PermissionDenied => TransportError::Device(TransportDeviceError::new(
                    TransportDeviceErrorKind::AccessDenied,
                    format!("permission denied opening {}", self.path),
                )),
                _ => TransportError::Io(e),
            })?;

        self.configure(&file)?;
        debug!("Serial port {} opened at {} baud", self.path, self.baud_rate);
        self.file = Some(file);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::NotOpen)?;
        match file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            },
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::NotOpen)?;
        file.write_all(bytes)?;
        // 等待数据真正发出
        termios::tcdrain(&*file).map_err(nix_error)?;
        trace!("serial wrote {} bytes", bytes.len());
        Ok(bytes.len())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(file) = self.file.take()
            && let Err(e) = termios::tcflush(&file, FlushArg::TCIOFLUSH)
        {
            warn!("Failed to flush {} on close: {}", self.path, e);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.path, self.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_is_not_found() {
        let mut port = SerialTransport::new("/dev/antlink-does-not-exist", 115_200);
        match port.open() {
            Err(TransportError::Device(e)) => assert_eq!(e.kind, TransportDeviceErrorKind::NotFound),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_io_before_open_fails() {
        let mut port = SerialTransport::new("/dev/ttyUSB9", 115_200);
        let mut buf = [0u8; 1];
        assert!(matches!(port.read(&mut buf), Err(TransportError::NotOpen)));
        assert!(matches!(port.write(&[1]), Err(TransportError::NotOpen)));
        assert!(port.close().is_ok());
    }

    #[test]
    fn test_unsupported_baud() {
        let port = SerialTransport::new("/dev/ttyUSB0", 12_345);
        assert!(port.baud().is_err());
        assert_eq!(port.describe(), "serial:/dev/ttyUSB0@12345");
    }
}
