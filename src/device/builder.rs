use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::time::Duration;

use super::thread::DeviceThread;
use super::{Device, DeviceHandle};
use crate::buffer::{BufferBuilder, DeviceBuffer};
use crate::Result;

/// `Device`のビルダ.
///
/// # Examples
///
/// ```
/// # extern crate fibers_global;
/// # extern crate scull;
/// use scull::buffer::BufferBuilder;
/// use scull::device::DeviceBuilder;
///
/// let mut buffer = BufferBuilder::new();
/// buffer.quantum_size(512).qset_size(64);
///
/// let device = DeviceBuilder::new().max_queue_len(1024).spawn_buffer(buffer);
/// let handle = device.handle();
///
/// let written = fibers_global::execute(
///     handle.request().wait_for_running().write(0, b"foo".to_vec()),
/// ).unwrap();
/// assert_eq!(written, 3);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    pub(crate) metrics: MetricBuilder,
    pub(crate) max_queue_len: usize,
    pub(crate) busy_threshold: usize,
    pub(crate) max_keep_busy_duration: Duration,
    pub(crate) logger: Logger,
}
impl DeviceBuilder {
    /// デフォルト設定で`DeviceBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        DeviceBuilder {
            metrics: MetricBuilder::new(),
            max_queue_len: 100_000,
            busy_threshold: 1_000,
            max_keep_busy_duration: Duration::from_secs(600),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// デバイスのメトリクスの登録に使われるビルダを設定する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// デバイススレッド内のキューに保持可能なコマンドの最大数を設定する.
    ///
    /// キューの長さがこの値を超えた時点で、デバイスは回復不能な過負荷状態にあるとみなされ、
    /// `ErrorKind::DeviceBusy`で停止する.
    ///
    /// 個々のリクエスト単位でのキュー長制限は`DeviceRequest::max_queue_len`で行う.
    ///
    /// デフォルト値は`100_000`.
    pub fn max_queue_len(&mut self, n: usize) -> &mut Self {
        self.max_queue_len = n;
        self
    }

    /// キューの長さが、この値以上の状態をビジーとみなす.
    ///
    /// ビジーであってもコマンドの受付は続けられるが、
    /// その状態が`max_keep_busy_duration`より長く続くと、デバイスは停止する.
    ///
    /// デフォルト値は`1_000`.
    pub fn busy_threshold(&mut self, n: usize) -> &mut Self {
        self.busy_threshold = n;
        self
    }

    /// ビジー状態の継続が許容される最大時間を設定する.
    ///
    /// デフォルト値は`Duration::from_secs(600)`.
    pub fn max_keep_busy_duration(&mut self, duration: Duration) -> &mut Self {
        self.max_keep_busy_duration = duration;
        self
    }

    /// デバイススレッドが使用するロガーを設定する.
    ///
    /// デフォルトでは、ログは全て破棄される.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// デバイスを起動する.
    ///
    /// デバイス毎に専用のOSスレッドが一つ起動され、
    /// そのスレッド上で`init_buffer`が呼び出されてバッファが生成される.
    /// `init_buffer`が完了するまでの間、デバイスは`DeviceStatus::Starting`状態となる.
    ///
    /// 返された`Device`を破棄すると、デバイスも停止する.
    pub fn spawn<F>(&self, init_buffer: F) -> Device
    where
        F: FnOnce() -> Result<DeviceBuffer> + Send + 'static,
    {
        let (thread_handle, thread_monitor) = DeviceThread::spawn(self.clone(), init_buffer);
        Device::new(thread_monitor, DeviceHandle(thread_handle))
    }

    /// `buffer`の設定でバッファを生成するデバイスを起動する.
    ///
    /// `self.spawn(move || buffer.build())`と等価.
    pub fn spawn_buffer(&self, buffer: BufferBuilder) -> Device {
        self.spawn(move || track!(buffer.build()))
    }
}
impl Default for DeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
