//! Quantum Allocator.
use std::mem;

use super::chain::{Quantum, QuantumSet, SlotArray};
use crate::metrics::AllocatorMetrics;
use crate::{ErrorKind, Result};

/// バッファ用のアロケータ.
///
/// 量子集合(ノード)、スロット配列、量子、の三種類のオブジェクトの割当と解放を担当する.
///
/// メモリ上限が設定されている場合には、それを超える割当要求は`ErrorKind::OutOfMemory`で失敗する.
/// 上限の判定には、各オブジェクトの(ヘッダを除いた)概算サイズが用いられる.
///
/// スロット配列と量子については、上限の有無に関わらず、
/// システムのアロケータが確保を拒否した場合にも同じエラーとなる.
#[derive(Debug)]
pub struct QuantumAllocator {
    memory_limit: Option<u64>,
    usage: u64,
    metrics: AllocatorMetrics,
}
impl QuantumAllocator {
    /// 新しい`QuantumAllocator`インスタンスを生成する.
    pub fn new(metrics: AllocatorMetrics, memory_limit: Option<u64>) -> Self {
        QuantumAllocator {
            memory_limit,
            usage: 0,
            metrics,
        }
    }

    /// 現在のメモリ使用量(概算)を返す.
    pub fn usage_bytes(&self) -> u64 {
        self.usage
    }

    /// メモリ上限を返す.
    pub fn memory_limit(&self) -> Option<u64> {
        self.memory_limit
    }

    /// 新たに`count`個の量子集合を割り当てても、メモリ上限を超えないことを確認する.
    ///
    /// 使用量は変化しない.
    /// 遠く離れた位置への書き込みで、大量のノードを連結し始める前の判定に用いる.
    pub fn ensure_nodes(&self, count: u64) -> Result<()> {
        let size = count.saturating_mul(mem::size_of::<QuantumSet>() as u64);
        track!(self.check_limit(size), "nodes={}", count)
    }

    /// 空の量子集合を割り当てる.
    ///
    /// 他のオブジェクトと異なり、システムのアロケータによる確保の失敗は検出できない.
    /// 大量のノードが必要な場合には、事前に`ensure_nodes`で上限を確認すること.
    pub fn allocate_node(&mut self) -> Result<Box<QuantumSet>> {
        let size = mem::size_of::<QuantumSet>() as u64;
        track!(self.reserve(size))?;
        self.metrics.allocated_nodes.increment();
        Ok(Box::new(QuantumSet::new()))
    }

    /// 全要素が空の、長さ`qset_size`のスロット配列を割り当てる.
    pub fn allocate_slots(&mut self, qset_size: usize) -> Result<SlotArray> {
        let size = (qset_size as u64).saturating_mul(mem::size_of::<Option<Quantum>>() as u64);
        track!(self.reserve(size))?;

        let mut slots = Vec::new();
        if let Err(e) = slots.try_reserve_exact(qset_size) {
            self.unreserve(size);
            self.metrics.failures.increment();
            track_panic!(ErrorKind::OutOfMemory, "{}", e);
        }
        slots.resize_with(qset_size, || None);
        self.metrics.allocated_slot_arrays.increment();
        Ok(slots.into_boxed_slice())
    }

    /// ゼロ初期化された`quantum_size`バイトの量子を割り当てる.
    pub fn allocate_quantum(&mut self, quantum_size: usize) -> Result<Quantum> {
        let size = quantum_size as u64;
        track!(self.reserve(size))?;

        let mut quantum = Vec::new();
        if let Err(e) = quantum.try_reserve_exact(quantum_size) {
            self.unreserve(size);
            self.metrics.failures.increment();
            track_panic!(ErrorKind::OutOfMemory, "{}", e);
        }
        quantum.resize(quantum_size, 0);
        self.metrics.allocated_quanta.increment();
        Ok(quantum.into_boxed_slice())
    }

    /// 量子集合を解放する.
    ///
    /// # 事前条件
    ///
    /// - `node`のスロット配列および後続ノードは、既に取り外されている
    pub fn release_node(&mut self, node: Box<QuantumSet>) {
        debug_assert!(node.is_detached());
        mem::drop(node);
        self.unreserve(mem::size_of::<QuantumSet>() as u64);
        self.metrics.released_nodes.increment();
    }

    /// スロット配列を解放する.
    ///
    /// 配列内に残っている量子も併せて解放される.
    pub fn release_slots(&mut self, mut slots: SlotArray) {
        for quantum in slots.iter_mut().filter_map(|q| q.take()) {
            self.release_quantum(quantum);
        }
        let size = (slots.len() as u64) * mem::size_of::<Option<Quantum>>() as u64;
        mem::drop(slots);
        self.unreserve(size);
        self.metrics.released_slot_arrays.increment();
    }

    /// 量子を解放する.
    pub fn release_quantum(&mut self, quantum: Quantum) {
        let size = quantum.len() as u64;
        mem::drop(quantum);
        self.unreserve(size);
        self.metrics.released_quanta.increment();
    }

    fn reserve(&mut self, size: u64) -> Result<()> {
        track!(self.check_limit(size))?;
        self.usage = self.usage.saturating_add(size);
        self.metrics.allocated_bytes.add_u64(size);
        Ok(())
    }

    fn check_limit(&self, size: u64) -> Result<()> {
        if let Some(limit) = self.memory_limit {
            if self.usage.saturating_add(size) > limit {
                self.metrics.failures.increment();
                track_panic!(
                    ErrorKind::OutOfMemory,
                    "usage={}, request={}, limit={}",
                    self.usage,
                    size,
                    limit
                );
            }
        }
        Ok(())
    }

    fn unreserve(&mut self, size: u64) {
        debug_assert!(size <= self.usage, "size={}, usage={}", size, self.usage);
        self.usage -= size;
        self.metrics.released_bytes.add_u64(size);
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use trackable::result::TestResult;

    use super::*;

    fn allocator(memory_limit: Option<u64>) -> QuantumAllocator {
        QuantumAllocator::new(AllocatorMetrics::new(&MetricBuilder::new()), memory_limit)
    }

    #[test]
    fn allocate_and_release_works() -> TestResult {
        let mut allocator = allocator(None);

        let quantum = track!(allocator.allocate_quantum(4000))?;
        assert_eq!(quantum.len(), 4000);
        assert!(quantum.iter().all(|&b| b == 0));
        assert_eq!(allocator.usage_bytes(), 4000);

        let mut slots = track!(allocator.allocate_slots(8))?;
        assert_eq!(slots.len(), 8);
        assert!(slots.iter().all(|s| s.is_none()));
        slots[3] = Some(quantum);

        let node = track!(allocator.allocate_node())?;
        assert!(node.is_detached());

        allocator.release_node(node);
        allocator.release_slots(slots); // 中の量子も解放される
        assert_eq!(allocator.usage_bytes(), 0);

        let metrics = &allocator.metrics;
        assert_eq!(metrics.allocated_quanta(), 1);
        assert_eq!(metrics.released_quanta(), 1);
        assert_eq!(metrics.quanta(), 0);
        assert_eq!(metrics.nodes(), 0);
        assert_eq!(metrics.usage_bytes(), 0);
        Ok(())
    }

    #[test]
    fn memory_limit_works() -> TestResult {
        let mut allocator = allocator(Some(100));

        let first = track!(allocator.allocate_quantum(60))?;
        let e = allocator.allocate_quantum(60).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::OutOfMemory));
        assert_eq!(allocator.usage_bytes(), 60); // 失敗した割当は使用量に計上されない
        assert_eq!(allocator.metrics.failures(), 1);

        allocator.release_quantum(first);
        let second = track!(allocator.allocate_quantum(60))?;
        assert_eq!(second.len(), 60);
        assert_eq!(allocator.memory_limit(), Some(100));
        Ok(())
    }

    #[test]
    fn ensure_nodes_works() -> TestResult {
        let node_size = mem::size_of::<QuantumSet>() as u64;
        let allocator = allocator(Some(node_size * 10));
        track!(allocator.ensure_nodes(10))?;
        assert_eq!(allocator.usage_bytes(), 0);

        let e = allocator.ensure_nodes(11).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::OutOfMemory));

        // 乗算が溢れるほどのノード数でも上限判定になる
        let e = allocator.ensure_nodes(u64::MAX).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::OutOfMemory));
        assert_eq!(allocator.metrics.failures(), 2);

        // 上限が無い場合には常に成功する
        let unlimited = self::allocator(None);
        track!(unlimited.ensure_nodes(u64::MAX))?;
        Ok(())
    }
}
