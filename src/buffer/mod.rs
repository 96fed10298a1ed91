//! デバイスのデータを保持するメモリ上のバッファ.
//!
//! # 構造
//!
//! バッファは、量子集合(ノード)を片方向に連結したチェインとして表現される.
//!
//! ```text
//! DeviceBuffer
//!   |
//!   +-> QuantumSet#0 --> QuantumSet#1 --> ... (next)
//!         |
//!         +-> [slot#0, slot#1, ..., slot#(qset_size-1)]
//!                |
//!                +-> quantum (quantum_size bytes)
//! ```
//!
//! - ノード、スロット配列、量子は、いずれも最初の書き込み時に遅延して割り当てられる
//! - 読み込みでは一切の割当は行われない
//! - 一回の読み書きで転送されるのは、最大でも一つの量子の範囲内のバイト列に限られる
//!   - 利用者は、要求サイズに満たない転送を繰り返すことで、任意の範囲を読み書きする
//!
//! このモジュールのバッファ自体は同期を行わない.
//! 複数スレッドからの利用は[device](../device/index.html)モジュール経由で直列化される.
use prometrics::metrics::MetricBuilder;
use slog::Logger;
use std::cmp;

pub use self::builder::{BufferBuilder, DEFAULT_MEMORY_LIMIT};

use self::allocator::QuantumAllocator;
use self::chain::Chain;
use crate::geometry::Geometry;
use crate::metrics::BufferMetrics;
use crate::{ErrorKind, Result};

mod allocator;
mod builder;
mod chain;

/// 量子集合のチェインによって構成される、成長可能なバイト列.
///
/// [モジュールドキュメント](index.html)も参照のこと.
#[derive(Debug)]
pub struct DeviceBuffer {
    chain: Chain,
    allocator: QuantumAllocator,
    geometry: Geometry,
    size: u64,
    metrics: BufferMetrics,
    logger: Logger,
}
impl DeviceBuffer {
    /// デフォルト設定でバッファを生成する.
    ///
    /// 設定を変更したい場合には`BufferBuilder`を使用すること.
    pub fn new_default() -> Self {
        DeviceBuffer::new(
            Geometry::default(),
            Some(DEFAULT_MEMORY_LIMIT),
            &MetricBuilder::new(),
            Logger::root(slog::Discard, o!()),
        )
    }

    pub(crate) fn new(
        geometry: Geometry,
        memory_limit: Option<u64>,
        metrics: &MetricBuilder,
        logger: Logger,
    ) -> Self {
        let metrics = BufferMetrics::new(metrics);
        let allocator = QuantumAllocator::new(metrics.allocator().clone(), memory_limit);
        DeviceBuffer {
            chain: Chain::new(),
            allocator,
            geometry,
            size: 0,
            metrics,
            logger,
        }
    }

    /// `position`から、最大で`buf.len()`バイトを読み込む.
    ///
    /// 実際に読み込まれたバイト数が返される.
    ///
    /// 以下の場合には、要求サイズよりも少ないバイト数が返される(エラーではない):
    ///
    /// - `position`がバッファサイズ以上: `0`
    /// - 読み込み範囲が量子の境界を跨ぐ: 量子の末尾までのバイト数
    /// - 読み込み範囲の量子が一度も書き込まれていない: `0`
    pub fn read(&self, position: u64, buf: &mut [u8]) -> usize {
        if position >= self.size {
            return 0;
        }
        let count = cmp::min(buf.len() as u64, self.size - position) as usize;

        let p = self.geometry.locate(position);
        let quantum = match self.chain.find(p.item).and_then(|n| n.quantum(p.slot)) {
            None => return 0,
            Some(quantum) => quantum,
        };
        let count = cmp::min(count, self.geometry.quantum_remaining(position));
        buf[..count].copy_from_slice(&quantum[p.offset..p.offset + count]);
        self.metrics.read_bytes.add_u64(count as u64);
        count
    }

    /// `position`に、最大で`buf.len()`バイトを書き込む.
    ///
    /// 実際に書き込まれたバイト数が返される.
    /// 書き込み範囲が量子の境界を跨ぐ場合には、量子の末尾までのみが書き込まれる.
    ///
    /// 書き込み位置がバッファサイズを超えている場合には、その位置までバッファが拡張される.
    /// 途中の書き込まれていない領域は穴として扱われ、メモリは割り当てられない.
    ///
    /// # Errors
    ///
    /// - 割当に失敗した場合には`ErrorKind::OutOfMemory`が返される
    ///   - この場合バイト列のコピーは一切行われないが、それ以前に割当済みのノード等は残される
    /// - 書き込み範囲の終端が`u64`に収まらない場合には`ErrorKind::InvalidInput`が返される
    pub fn write(&mut self, position: u64, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let p = self.geometry.locate(position);
        let count = cmp::min(buf.len(), self.geometry.quantum_remaining(position));
        let end = match position.checked_add(count as u64) {
            Some(end) => end,
            None => track_panic!(
                ErrorKind::InvalidInput,
                "position={}, count={}",
                position,
                count
            ),
        };

        let geometry = self.geometry;
        let allocator = &mut self.allocator;
        let result = self
            .chain
            .follow(p.item, allocator)
            .and_then(|node| node.quantum_or_allocate(p.slot, geometry, allocator));
        let quantum = match result {
            Err(e) => {
                warn!(self.logger, "Cannot allocate memory for writing";
                      "position" => position,
                      "usage" => self.allocator.usage_bytes(),
                      "limit" => ?self.allocator.memory_limit());
                return Err(track!(e));
            }
            Ok(quantum) => quantum,
        };
        quantum[p.offset..p.offset + count].copy_from_slice(&buf[..count]);

        self.metrics.written_bytes.add_u64(count as u64);
        if self.size < end {
            self.size = end;
            self.metrics.size_bytes.set(end as f64);
        }
        Ok(count)
    }

    /// バッファの全データを解放して、空の状態に戻す.
    ///
    /// 空のバッファに対して呼び出した場合には何も行わない.
    pub fn trim(&mut self) {
        let released = self.chain.release(&mut self.allocator);
        self.size = 0;
        self.metrics.size_bytes.set(0.0);
        self.metrics.trims.increment();
        debug!(self.logger, "Buffer trimmed"; "released_nodes" => released);
    }

    /// バッファの論理サイズ(これまでに書き込まれた最大のオフセット)を返す.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// チェインにノードが一つも無いかどうかを判定する.
    ///
    /// 論理サイズではなく割当状況を見るので、量子の割当に失敗した書き込みの後などには、
    /// `size() == 0`でも`false`となり得る.
    pub fn has_no_nodes(&self) -> bool {
        self.chain.is_empty()
    }

    /// バッファの幾何情報を返す.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// チェインのノード数を返す.
    pub fn nodes(&self) -> usize {
        self.chain.len()
    }

    /// 割当済みの量子の数を返す.
    ///
    /// チェインを辿って数えるので、ノード数に比例した時間が掛かる.
    pub fn quanta(&self) -> usize {
        self.chain.quanta()
    }

    /// 現在のメモリ使用量(概算)を返す.
    pub fn usage_bytes(&self) -> u64 {
        self.allocator.usage_bytes()
    }

    /// バッファの状態のスナップショットを返す.
    pub fn stat(&self) -> BufferStat {
        BufferStat {
            size: self.size,
            geometry: self.geometry,
            nodes: self.nodes(),
            quanta: self.quanta(),
            usage_bytes: self.usage_bytes(),
        }
    }

    /// バッファのメトリクスを返す.
    pub fn metrics(&self) -> &BufferMetrics {
        &self.metrics
    }
}
impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.chain.release(&mut self.allocator);
    }
}

/// バッファの状態.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStat {
    /// 論理サイズ.
    pub size: u64,

    /// 幾何情報.
    pub geometry: Geometry,

    /// チェインのノード数.
    pub nodes: usize,

    /// 割当済みの量子の数.
    pub quanta: usize,

    /// メモリ使用量(概算).
    pub usage_bytes: u64,
}
