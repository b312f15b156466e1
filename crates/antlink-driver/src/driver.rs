//! 控制方句柄
//!
//! `AntDriver` 封装 run-loop 线程。控制方只通过控制状态请求动作、读取遥测快照、
//! 接收事件，从不直接触碰通道状态。

use crate::capture::DebugCapture;
use crate::error::DriverError;
use crate::pipeline::RunLoop;
use crate::state::{DriverContext, DriverEvent};
use crate::status::DriverState;
use crate::telemetry::RealtimeData;
use antlink_transport::Transport;
use crossbeam_channel::Receiver;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// Drop 时等待 run-loop 线程退出的最长时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // watchdog 线程代为 join，超时后由操作系统在进程退出时回收
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// ANT 驱动句柄
pub struct AntDriver {
    ctx: Arc<DriverContext>,
    events: Receiver<DriverEvent>,
    /// 启动前持有，启动时移交给 run-loop 线程
    run_loop: Option<RunLoop<Box<dyn Transport>>>,
    run_thread: Option<JoinHandle<Result<(), DriverError>>>,
    capture: Arc<OnceLock<DebugCapture>>,
}

impl AntDriver {
    pub(crate) fn new(
        run_loop: RunLoop<Box<dyn Transport>>,
        ctx: Arc<DriverContext>,
        events: Receiver<DriverEvent>,
    ) -> Self {
        Self {
            ctx,
            events,
            capture: run_loop.debug_capture(),
            run_loop: Some(run_loop),
            run_thread: None,
        }
    }

    /// 启动 run-loop 线程（只能调用一次）
    ///
    /// 传输层在 run-loop 线程中打开；打开失败时线程返回错误，状态变为 Stopped，
    /// 可通过 [`join`](Self::join) 取得错误。调试录制文件在打开成功后才截断创建。
    pub fn start(&mut self) -> Result<(), DriverError> {
        self.ctx.status.start()?;
        let run_loop = self.run_loop.take().ok_or(DriverError::AlreadyStarted)?;

        let handle = thread::Builder::new()
            .name("antlink-run".into())
            .spawn(move || run_loop.run())
            .map_err(|e| {
                self.ctx.status.stop();
                DriverError::RunThread(e.to_string())
            })?;
        self.run_thread = Some(handle);
        info!("ANT driver started");
        Ok(())
    }

    /// Running -> Paused
    ///
    /// 暂停不影响 run-loop 读取数据，遥测继续更新。
    pub fn pause(&self) -> Result<(), DriverError> {
        Ok(self.ctx.status.pause()?)
    }

    /// Paused -> Running
    pub fn restart(&self) -> Result<(), DriverError> {
        Ok(self.ctx.status.restart()?)
    }

    /// 请求停止并关闭调试录制（可重复调用）
    pub fn stop(&self) {
        let previous = self.ctx.status.stop();
        if let Some(capture) = self.capture.get() {
            capture.close();
        }
        if previous != DriverState::Stopped {
            info!("ANT driver stop requested");
        }
    }

    pub fn state(&self) -> DriverState {
        self.ctx.status.get()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    /// 复制最新遥测读数，保留调用方的 mode/load/slope
    pub fn get_realtime_data(&self, rt: &mut RealtimeData) {
        rt.copy_readings_from(&self.ctx.telemetry.load());
    }

    /// 最新遥测快照
    pub fn realtime_data(&self) -> RealtimeData {
        self.ctx.snapshot()
    }

    /// 设备发现/丢失/搜索超时事件
    pub fn events(&self) -> &Receiver<DriverEvent> {
        &self.events
    }

    /// 因队列满被丢弃的事件数
    pub fn dropped_events(&self) -> u64 {
        self.ctx.dropped_events()
    }

    /// 等待 run-loop 线程结束并返回其结果
    ///
    /// 未启动或已经 join 过时直接返回 Ok。
    pub fn join(&mut self) -> Result<(), DriverError> {
        match self.run_thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| DriverError::RunThread("run-loop thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for AntDriver {
    fn drop(&mut self) {
        self.stop();

        if let Some(handle) = self.run_thread.take()
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "Run-loop thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }
    }
}

impl std::fmt::Debug for AntDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AntDriver")
            .field("state", &self.state())
            .field("capture", &self.capture.get())
            .finish()
    }
}
