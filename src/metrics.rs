//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

#[cfg(feature = "device")]
use crate::device::{Command, DeviceStatus};

/// [`DeviceBuffer`]のメトリクス.
///
/// [`DeviceBuffer`]: ../buffer/struct.DeviceBuffer.html
#[derive(Debug, Clone)]
pub struct BufferMetrics {
    pub(crate) size_bytes: Gauge,
    pub(crate) read_bytes: Counter,
    pub(crate) written_bytes: Counter,
    pub(crate) trims: Counter,
    allocator: AllocatorMetrics,
}
impl BufferMetrics {
    /// バッファの論理サイズ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_buffer_size_bytes <GAUGE>
    /// ```
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.value() as u64
    }

    /// 読み込まれたバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_buffer_read_bytes_total <COUNTER>
    /// ```
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.value() as u64
    }

    /// 書き込まれたバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_buffer_written_bytes_total <COUNTER>
    /// ```
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes.value() as u64
    }

    /// トリムの実行回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_buffer_trims_total <COUNTER>
    /// ```
    pub fn trims(&self) -> u64 {
        self.trims.value() as u64
    }

    /// アロケータのメトリクスを返す.
    pub fn allocator(&self) -> &AllocatorMetrics {
        &self.allocator
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let allocator = AllocatorMetrics::new(builder);
        let mut builder = builder.clone();
        builder.namespace("scull").subsystem("buffer");
        BufferMetrics {
            size_bytes: builder
                .gauge("size_bytes")
                .help("Logical size of the buffer")
                .finish()
                .expect("Never fails"),
            read_bytes: builder
                .counter("read_bytes_total")
                .help("Number of bytes read from the buffer")
                .finish()
                .expect("Never fails"),
            written_bytes: builder
                .counter("written_bytes_total")
                .help("Number of bytes written to the buffer")
                .finish()
                .expect("Never fails"),
            trims: builder
                .counter("trims_total")
                .help("Number of trims")
                .finish()
                .expect("Never fails"),
            allocator,
        }
    }
}

/// 量子・スロット配列・量子集合の割当に関するメトリクス.
#[derive(Debug, Clone)]
pub struct AllocatorMetrics {
    pub(crate) allocated_nodes: Counter,
    pub(crate) released_nodes: Counter,
    pub(crate) allocated_slot_arrays: Counter,
    pub(crate) released_slot_arrays: Counter,
    pub(crate) allocated_quanta: Counter,
    pub(crate) released_quanta: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) failures: Counter,
}
impl AllocatorMetrics {
    /// 割り当てられた量子集合(ノード)の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_total { object="node" } <COUNTER>
    /// ```
    pub fn allocated_nodes(&self) -> u64 {
        self.allocated_nodes.value() as u64
    }

    /// 解放された量子集合(ノード)の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_released_total { object="node" } <COUNTER>
    /// ```
    pub fn released_nodes(&self) -> u64 {
        self.released_nodes.value() as u64
    }

    /// 割り当てられたスロット配列の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_total { object="slot_array" } <COUNTER>
    /// ```
    pub fn allocated_slot_arrays(&self) -> u64 {
        self.allocated_slot_arrays.value() as u64
    }

    /// 解放されたスロット配列の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_released_total { object="slot_array" } <COUNTER>
    /// ```
    pub fn released_slot_arrays(&self) -> u64 {
        self.released_slot_arrays.value() as u64
    }

    /// 割り当てられた量子の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_total { object="quantum" } <COUNTER>
    /// ```
    pub fn allocated_quanta(&self) -> u64 {
        self.allocated_quanta.value() as u64
    }

    /// 解放された量子の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_released_total { object="quantum" } <COUNTER>
    /// ```
    pub fn released_quanta(&self) -> u64 {
        self.released_quanta.value() as u64
    }

    /// 現在のノード数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_total { object="node" } - scull_allocator_released_total { object="node" }
    /// ```
    pub fn nodes(&self) -> u64 {
        // 減少側を先に読む
        let dec = self.released_nodes();
        let inc = self.allocated_nodes();
        inc - dec
    }

    /// 現在の量子数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_total { object="quantum" } - scull_allocator_released_total { object="quantum" }
    /// ```
    pub fn quanta(&self) -> u64 {
        // 解放数を先に読まないと差がマイナスになり得る
        let dec = self.released_quanta();
        let inc = self.allocated_quanta();
        inc - dec
    }

    /// 割り当てられたバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// 解放されたバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 現在のメモリ使用量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_allocated_bytes_total - scull_allocator_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: released -> allocated の順で読むこと
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// 割当に失敗した回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_allocator_failures_total <COUNTER>
    /// ```
    pub fn failures(&self) -> u64 {
        self.failures.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("scull").subsystem("allocator");
        let counter = |name: &str, help: &str, object| {
            builder
                .counter(name)
                .help(help)
                .label("object", object)
                .finish()
                .expect("Never fails")
        };
        let allocated = "Number of allocated objects";
        let released = "Number of released objects";
        AllocatorMetrics {
            allocated_nodes: counter("allocated_total", allocated, "node"),
            released_nodes: counter("released_total", released, "node"),
            allocated_slot_arrays: counter("allocated_total", allocated, "slot_array"),
            released_slot_arrays: counter("released_total", released, "slot_array"),
            allocated_quanta: counter("allocated_total", allocated, "quantum"),
            released_quanta: counter("released_total", released, "quantum"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated bytes")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released bytes")
                .finish()
                .expect("Never fails"),
            failures: builder
                .counter("failures_total")
                .help("Number of allocation failures")
                .finish()
                .expect("Never fails"),
        }
    }
}

/// [`Device`]の管理スレッドとキューに関するメトリクス.
///
/// [`Device`]: ../device/struct.Device.html
#[cfg(feature = "device")]
#[derive(Debug, Clone)]
pub struct DeviceMetrics {
    pub(crate) status: Gauge,
    pub(crate) enqueued_commands: DeviceCommandCounter,
    pub(crate) dequeued_commands: DeviceCommandCounter,
    pub(crate) failed_commands: DeviceCommandCounter,
    pub(crate) busy_commands: DeviceCommandCounter,
    pub(crate) abandoned_commands: DeviceCommandCounter,
}
#[cfg(feature = "device")]
impl DeviceMetrics {
    /// 現在の稼働状態.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_device_status <GAUGE>
    /// ```
    pub fn status(&self) -> DeviceStatus {
        match self.status.value() as u8 {
            1 => DeviceStatus::Starting,
            2 => DeviceStatus::Running,
            _ => DeviceStatus::Stopped,
        }
    }

    /// 管理スレッドに送信されたコマンドの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_device_enqueued_commands_total { command="read|write|trim|open|release|stat|stop" } <COUNTER>
    /// ```
    pub fn enqueued_commands(&self) -> &DeviceCommandCounter {
        &self.enqueued_commands
    }

    /// 実行のためにキューから取り出されたコマンドの数.
    ///
    /// 放棄されたコマンドも含まれる.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_device_dequeued_commands_total { command="read|write|trim|open|release|stat|stop" } <COUNTER>
    /// ```
    pub fn dequeued_commands(&self) -> &DeviceCommandCounter {
        &self.dequeued_commands
    }

    /// エラーで終了したコマンドの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_device_failed_commands_total { command="read|write|trim|open|release|stat|stop" } <COUNTER>
    /// ```
    pub fn failed_commands(&self) -> &DeviceCommandCounter {
        &self.failed_commands
    }

    /// キュー長の制限や起動中であることを理由に、受付を拒否されたコマンドの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_device_busy_commands_total { command="read|write|trim|open|release|stat|stop" } <COUNTER>
    /// ```
    pub fn busy_commands(&self) -> &DeviceCommandCounter {
        &self.busy_commands
    }

    /// 実行開始前に要求元が待機を中断したコマンドの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// scull_device_abandoned_commands_total { command="read|write|trim|open|release|stat|stop" } <COUNTER>
    /// ```
    pub fn abandoned_commands(&self) -> &DeviceCommandCounter {
        &self.abandoned_commands
    }

    /// 実行待ちのコマンド数.
    ///
    /// 追加数と取り出し数の差として算出される.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// sum(scull_device_enqueued_commands_total - scull_device_dequeued_commands_total)
    /// ```
    pub fn queue_len(&self) -> usize {
        // 取り出し数 -> 追加数 の順で読むこと(逆だとアンダーフローし得る)
        let dec = self.dequeued_commands.sum();
        let inc = self.enqueued_commands.sum();
        (inc - dec) as usize
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("scull").subsystem("device");
        DeviceMetrics {
            status: builder
                .gauge("status")
                .help("Status of the device (0=stopped, 1=starting, 2=running)")
                .finish()
                .expect("Never fails"),
            enqueued_commands: DeviceCommandCounter::new(
                &builder,
                "enqueued_commands_total",
                "Number of enqueued commands",
            ),
            dequeued_commands: DeviceCommandCounter::new(
                &builder,
                "dequeued_commands_total",
                "Number of dequeued commands",
            ),
            failed_commands: DeviceCommandCounter::new(
                &builder,
                "failed_commands_total",
                "Number of commands failed to execute",
            ),
            busy_commands: DeviceCommandCounter::new(
                &builder,
                "busy_commands_total",
                "Number of commands gave up to execute due to the device is busy",
            ),
            abandoned_commands: DeviceCommandCounter::new(
                &builder,
                "abandoned_commands_total",
                "Number of commands abandoned by the requester before execution",
            ),
        }
    }
}

/// デバイスのコマンド毎のカウンタ.
#[cfg(feature = "device")]
#[derive(Debug, Clone)]
pub struct DeviceCommandCounter {
    pub(crate) read: Counter,
    pub(crate) write: Counter,
    pub(crate) trim: Counter,
    pub(crate) open: Counter,
    pub(crate) release: Counter,
    pub(crate) stat: Counter,
    pub(crate) stop: Counter,
}
#[cfg(feature = "device")]
impl DeviceCommandCounter {
    /// READコマンド用のカウンタの値を返す.
    pub fn read(&self) -> u64 {
        self.read.value() as u64
    }

    /// WRITEコマンド用のカウンタの値を返す.
    pub fn write(&self) -> u64 {
        self.write.value() as u64
    }

    /// TRIMコマンド用のカウンタの値を返す.
    pub fn trim(&self) -> u64 {
        self.trim.value() as u64
    }

    /// OPENコマンド用のカウンタの値を返す.
    pub fn open(&self) -> u64 {
        self.open.value() as u64
    }

    /// RELEASEコマンド用のカウンタの値を返す.
    pub fn release(&self) -> u64 {
        self.release.value() as u64
    }

    /// STATコマンド用のカウンタの値を返す.
    pub fn stat(&self) -> u64 {
        self.stat.value() as u64
    }

    /// STOPコマンド用のカウンタの値を返す.
    pub fn stop(&self) -> u64 {
        self.stop.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder, name: &str, help: &str) -> Self {
        let counter = |command| {
            builder
                .counter(name)
                .help(help)
                .label("command", command)
                .finish()
                .expect("Never fails")
        };
        DeviceCommandCounter {
            read: counter("read"),
            write: counter("write"),
            trim: counter("trim"),
            open: counter("open"),
            release: counter("release"),
            stat: counter("stat"),
            stop: counter("stop"),
        }
    }

    pub(crate) fn increment(&self, command: &Command) {
        match *command {
            Command::Read { .. } => self.read.increment(),
            Command::Write { .. } => self.write.increment(),
            Command::Trim { .. } => self.trim.increment(),
            Command::Open { .. } => self.open.increment(),
            Command::Release { .. } => self.release.increment(),
            Command::Stat { .. } => self.stat.increment(),
            Command::Stop { .. } => self.stop.increment(),
        }
    }

    fn sum(&self) -> u64 {
        self.read()
            + self.write()
            + self.trim()
            + self.open()
            + self.release()
            + self.stat()
            + self.stop()
    }
}
