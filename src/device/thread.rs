use fibers::sync::oneshot;
use futures::{Future, Poll};
use slog::Logger;
use std::cmp;
use std::sync::mpsc as std_mpsc;
use std::sync::mpsc::SendError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use trackable::error::ErrorKindExt;

use crate::buffer::DeviceBuffer;
use crate::device::command::{Command, CommandReceiver, CommandSender};
use crate::device::queue::DeadlineQueue;
use crate::device::{DeviceBuilder, DeviceStatus};
use crate::file::AccessMode;
use crate::metrics::DeviceMetrics;
use crate::{Error, ErrorKind, Result};

/// デバイスの実行スレッド.
///
/// バッファを排他的に所有し、受け取ったコマンドをデッドライン順に一つずつ実行する.
/// バッファに触れるのはこのスレッドだけなので、各操作は互いに排他的となる.
#[derive(Debug)]
pub struct DeviceThread {
    buffer: DeviceBuffer,
    queue: DeadlineQueue,
    command_rx: CommandReceiver,
    overload: OverloadDetector,
    metrics: DeviceMetrics,
    logger: Logger,
}
impl DeviceThread {
    /// デバイスの実行スレッドを起動する.
    pub fn spawn<F>(builder: DeviceBuilder, init_buffer: F) -> (DeviceThreadHandle, DeviceThreadMonitor)
    where
        F: FnOnce() -> Result<DeviceBuffer> + Send + 'static,
    {
        let metrics = DeviceMetrics::new(&builder.metrics);
        metrics.status.set(f64::from(DeviceStatus::Starting as u8));

        let (command_tx, command_rx) = std_mpsc::channel();
        let (monitored, monitor) = oneshot::monitor();
        let handle = DeviceThreadHandle {
            command_tx,
            metrics: Arc::new(metrics.clone()),
        };

        thread::spawn(move || {
            let logger = builder.logger.clone();
            let result = track!(init_buffer()).and_then(|buffer| {
                let mut device = DeviceThread::new(&builder, buffer, command_rx, metrics.clone());
                track!(device.run())
            });
            metrics.status.set(f64::from(DeviceStatus::Stopped as u8));
            if let Err(ref e) = result {
                warn!(logger, "Device stopped abnormally"; "error" => %e);
            }
            monitored.exit(result);
        });

        (handle, DeviceThreadMonitor(monitor))
    }

    fn new(
        builder: &DeviceBuilder,
        buffer: DeviceBuffer,
        command_rx: CommandReceiver,
        metrics: DeviceMetrics,
    ) -> Self {
        let overload = OverloadDetector {
            max_queue_len: builder.max_queue_len,
            busy_threshold: builder.busy_threshold,
            max_keep_busy_duration: builder.max_keep_busy_duration,
            busy_since: None,
        };
        DeviceThread {
            buffer,
            queue: DeadlineQueue::new(),
            command_rx,
            overload,
            metrics,
            logger: builder.logger.clone(),
        }
    }

    fn run(&mut self) -> Result<()> {
        self.metrics.status.set(f64::from(DeviceStatus::Running as u8));
        let geometry = self.buffer.geometry();
        info!(self.logger, "Device started";
              "quantum_size" => geometry.quantum_size(),
              "qset_size" => geometry.qset_size());

        while track!(self.run_once())? {}

        info!(self.logger, "Device stopped";
              "size" => self.buffer.size(),
              "pending_commands" => self.queue.len());
        Ok(())
    }

    fn run_once(&mut self) -> Result<bool> {
        // 実行よりも受信を優先して、キュー内で全コマンドのデッドラインが比較されるようにする
        let command = if let Ok(command) = self.command_rx.try_recv() {
            command
        } else if let Some(command) = self.queue.pop() {
            track!(self.overload.check_busy(self.queue.len()))?;
            self.metrics.dequeued_commands.increment(&command);
            return track!(self.execute(command));
        } else if let Ok(command) = self.command_rx.recv() {
            command
        } else {
            debug!(self.logger, "All device handles were dropped");
            return Ok(false);
        };
        track!(self.overload.check_queue_len(self.queue.len()))?;
        self.queue.push(command);
        Ok(true)
    }

    fn execute(&mut self, command: Command) -> Result<bool> {
        if !command.start() {
            self.metrics.abandoned_commands.increment(&command);
            return Ok(true);
        }
        match command {
            Command::Read(c) => {
                let data = self.read(c.position(), c.length());
                c.reply(Ok(data));
            }
            Command::Write(c) => {
                let result = track!(self.buffer.write(c.position(), c.data()));
                if result.is_err() {
                    self.metrics.failed_commands.write.increment();
                }
                let critical = maybe_critical_error(&result);
                c.reply(result);
                if let Some(e) = critical {
                    return Err(e);
                }
            }
            Command::Trim(c) => {
                self.buffer.trim();
                c.reply(Ok(()));
            }
            Command::Open(c) => {
                self.open(c.mode());
                c.reply(Ok(()));
            }
            Command::Release(c) => c.reply(Ok(())),
            Command::Stat(c) => c.reply(Ok(self.buffer.stat())),
            Command::Stop(_) => return Ok(false),
        }
        Ok(true)
    }

    fn read(&self, position: u64, length: usize) -> Vec<u8> {
        // 一回の読み込みは量子一つ分を超えない
        let mut buf = vec![0; cmp::min(length, self.buffer.geometry().quantum_size())];
        let read_size = self.buffer.read(position, &mut buf);
        buf.truncate(read_size);
        buf
    }

    fn open(&mut self, mode: AccessMode) {
        if mode.truncates() {
            debug!(self.logger, "Truncating the buffer"; "size" => self.buffer.size());
            self.buffer.trim();
        }
    }
}

/// デバイスの過負荷検出器.
#[derive(Debug)]
struct OverloadDetector {
    max_queue_len: usize,
    busy_threshold: usize,
    max_keep_busy_duration: Duration,
    busy_since: Option<Instant>,
}
impl OverloadDetector {
    fn check_queue_len(&self, queue_len: usize) -> Result<()> {
        track_assert!(queue_len <= self.max_queue_len, ErrorKind::DeviceBusy;
                      queue_len, self.max_queue_len);
        Ok(())
    }

    fn check_busy(&mut self, queue_len: usize) -> Result<()> {
        if queue_len < self.busy_threshold {
            self.busy_since = None;
            return Ok(());
        }
        let busy_since = *self.busy_since.get_or_insert_with(Instant::now);
        let elapsed = busy_since.elapsed();
        track_assert!(elapsed <= self.max_keep_busy_duration, ErrorKind::DeviceBusy;
                      elapsed, self.max_keep_busy_duration, self.busy_threshold);
        Ok(())
    }
}

/// バッファの状態が壊れている可能性があるエラーかどうかを判定.
fn maybe_critical_error<T>(result: &Result<T>) -> Option<Error> {
    result.as_ref().err().and_then(|e| match *e.kind() {
        ErrorKind::InconsistentState | ErrorKind::Other => Some(e.clone()),
        _ => None,
    })
}

/// デバイスの実行スレッドの死活監視用オブジェクト.
#[derive(Debug)]
pub struct DeviceThreadMonitor(oneshot::Monitor<(), Error>);
impl Future for DeviceThreadMonitor {
    type Item = ();
    type Error = Error;
    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        track!(self.0.poll().map_err(|e| {
            e.unwrap_or_else(|| {
                ErrorKind::DeviceTerminated
                    .cause("The device thread exited without reporting its result")
                    .into()
            })
        }))
    }
}

/// デバイススレッドにコマンドを送るためのハンドル.
#[derive(Debug, Clone)]
pub struct DeviceThreadHandle {
    command_tx: CommandSender,
    metrics: Arc<DeviceMetrics>,
}
impl DeviceThreadHandle {
    pub fn send_command(&self, command: Command) {
        self.metrics.enqueued_commands.increment(&command);
        if let Err(SendError(command)) = self.command_tx.send(command) {
            // 受信側が既に存在しないので、キューから取り出されたものとして扱う
            self.metrics.dequeued_commands.increment(&command);
            self.metrics.failed_commands.increment(&command);
            let e = ErrorKind::DeviceTerminated.cause("The device has stopped");
            command.failed(track!(e).into());
        }
    }

    pub fn metrics(&self) -> &Arc<DeviceMetrics> {
        &self.metrics
    }
}
