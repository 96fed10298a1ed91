use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use super::DeviceBuffer;
use crate::geometry::{Geometry, DEFAULT_QSET_SIZE, DEFAULT_QUANTUM_SIZE};
use crate::Result;

/// バッファのメモリ上限のデフォルト値(1GiB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 1 << 30;

/// `DeviceBuffer`のビルダ.
#[derive(Debug, Clone)]
pub struct BufferBuilder {
    quantum_size: usize,
    qset_size: usize,
    memory_limit: Option<u64>,
    metrics: MetricBuilder,
    logger: Logger,
}
impl BufferBuilder {
    /// 新しい`BufferBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        BufferBuilder {
            quantum_size: DEFAULT_QUANTUM_SIZE,
            qset_size: DEFAULT_QSET_SIZE,
            memory_limit: Some(DEFAULT_MEMORY_LIMIT),
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// 量子のサイズ(バイト単位)を設定する.
    ///
    /// ここで指定した値はバッファの生成時に固定され、トリム後も変わらない.
    ///
    /// デフォルト値は`4000`.
    pub fn quantum_size(&mut self, size: usize) -> &mut Self {
        self.quantum_size = size;
        self
    }

    /// 一つの量子集合が保持するスロット数を設定する.
    ///
    /// ここで指定した値はバッファの生成時に固定され、トリム後も変わらない.
    ///
    /// デフォルト値は`1000`.
    pub fn qset_size(&mut self, size: usize) -> &mut Self {
        self.qset_size = size;
        self
    }

    /// バッファが割り当て可能なメモリ量の上限(バイト単位)を設定する.
    ///
    /// 上限を超える割当が必要になった書き込みは`ErrorKind::OutOfMemory`で失敗する.
    ///
    /// デフォルト値は`DEFAULT_MEMORY_LIMIT`.
    pub fn memory_limit(&mut self, limit: u64) -> &mut Self {
        self.memory_limit = Some(limit);
        self
    }

    /// メモリ上限を撤廃する.
    ///
    /// この場合、非常に遠い位置への書き込みは、
    /// それまでの全ノードの連結のためにプロセスのメモリを使い尽くし得る.
    pub fn unlimited_memory(&mut self) -> &mut Self {
        self.memory_limit = None;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// バッファ用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 新規にバッファを生成する.
    ///
    /// # Errors
    ///
    /// 量子サイズおよび量子集合サイズが不正な場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn build(&self) -> Result<DeviceBuffer> {
        let geometry = track!(Geometry::new(self.quantum_size, self.qset_size))?;
        Ok(DeviceBuffer::new(
            geometry,
            self.memory_limit,
            &self.metrics,
            self.logger.clone(),
        ))
    }
}
impl Default for BufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}
