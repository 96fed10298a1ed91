use std::fmt;

use super::allocator::QuantumAllocator;
use crate::geometry::Geometry;
use crate::{ErrorKind, Result};

/// 量子(データ格納用の固定長バイト列).
pub type Quantum = Box<[u8]>;

/// 量子集合が保持するスロット配列.
///
/// 一度割り当てられた配列の長さは、常に`qset_size`に等しい.
pub type SlotArray = Box<[Option<Quantum>]>;

/// 量子集合(チェインのノード).
///
/// スロット配列と後続ノードへのリンクを保持する.
/// どちらも必要になるまで割り当てられない.
pub struct QuantumSet {
    slots: Option<SlotArray>,
    next: Option<Box<QuantumSet>>,
}
impl QuantumSet {
    pub(crate) fn new() -> Self {
        QuantumSet {
            slots: None,
            next: None,
        }
    }

    /// 指定スロットの量子を返す.
    ///
    /// スロット配列ないし量子が未割当の場合には`None`が返される.
    pub fn quantum(&self, slot: usize) -> Option<&[u8]> {
        self.slots.as_ref()?.get(slot)?.as_deref()
    }

    /// 指定スロットの量子を返す.
    ///
    /// スロット配列および量子が未割当の場合には、それらの割当が行われる.
    /// 量子の割当に失敗した場合でも、割当済みのスロット配列はノードに残される.
    pub fn quantum_or_allocate(
        &mut self,
        slot: usize,
        geometry: Geometry,
        allocator: &mut QuantumAllocator,
    ) -> Result<&mut [u8]> {
        let slots = match self.slots.take() {
            Some(slots) => slots,
            None => track!(allocator.allocate_slots(geometry.qset_size()))?,
        };
        let slots = self.slots.insert(slots);
        track_assert!(slot < slots.len(), ErrorKind::InconsistentState; slot, slots.len());

        let quantum = match slots[slot].take() {
            Some(quantum) => quantum,
            None => track!(allocator.allocate_quantum(geometry.quantum_size()))?,
        };
        let quantum: &mut [u8] = slots[slot].insert(quantum);
        Ok(quantum)
    }

    /// 割当済みの量子の数を返す.
    pub fn quanta(&self) -> usize {
        self.slots
            .as_ref()
            .map_or(0, |slots| slots.iter().filter(|s| s.is_some()).count())
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.slots.is_none() && self.next.is_none()
    }
}
impl fmt::Debug for QuantumSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // 後続ノードまで再帰的に出力するのを避けるために手動で実装している
        f.debug_struct("QuantumSet")
            .field("slots", &self.slots.as_ref().map(|s| s.len()))
            .field("quanta", &self.quanta())
            .field("has_next", &self.next.is_some())
            .finish()
    }
}

/// 量子集合の片方向連結リスト.
///
/// 各ノードは直前のノード(先頭ノードの場合はチェイン自体)によって排他的に所有される.
pub struct Chain {
    head: Option<Box<QuantumSet>>,
    nodes: u64,
}
impl Chain {
    /// 空のチェインを生成する.
    pub fn new() -> Self {
        Chain {
            head: None,
            nodes: 0,
        }
    }

    /// チェインが空かどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// `item`番目のノードを返す.
    ///
    /// チェインがそこまで伸びていない場合には`None`が返される(ノードの割当は行わない).
    pub fn find(&self, item: u64) -> Option<&QuantumSet> {
        let mut node = self.head.as_deref()?;
        for _ in 0..item {
            node = node.next.as_deref()?;
        }
        Some(node)
    }

    /// `item`番目のノードを返す.
    ///
    /// チェインがそこまで伸びていない場合には、必要な数の空ノードを末尾に連結する.
    ///
    /// 追加が必要なノード群がメモリ上限に収まらない場合には、
    /// 一つもノードを連結せずに`ErrorKind::OutOfMemory`を返す.
    pub fn follow(&mut self, item: u64, allocator: &mut QuantumAllocator) -> Result<&mut QuantumSet> {
        let missing = item.saturating_add(1).saturating_sub(self.nodes);
        track!(allocator.ensure_nodes(missing), "item={}", item)?;

        let nodes = &mut self.nodes;
        let mut link = &mut self.head;
        for _ in 0..item {
            link = &mut track!(link_or_allocate(link, nodes, allocator))?.next;
        }
        track!(link_or_allocate(link, nodes, allocator))
    }

    /// チェイン内の全ノードを、先頭から順に解放する.
    ///
    /// 解放したノードの数を返す.
    pub fn release(&mut self, allocator: &mut QuantumAllocator) -> usize {
        let mut released = 0;
        let mut next = self.head.take();
        while let Some(mut node) = next {
            next = node.next.take();
            if let Some(slots) = node.slots.take() {
                allocator.release_slots(slots);
            }
            allocator.release_node(node);
            released += 1;
        }
        self.nodes = 0;
        released
    }

    /// チェインのノード数を返す.
    pub fn len(&self) -> usize {
        self.nodes as usize
    }

    /// チェイン全体で割当済みの量子の数を返す.
    pub fn quanta(&self) -> usize {
        self.iter().map(QuantumSet::quanta).sum()
    }

    fn iter(&self) -> impl Iterator<Item = &QuantumSet> {
        let mut next = self.head.as_deref();
        std::iter::from_fn(move || {
            let node = next?;
            next = node.next.as_deref();
            Some(node)
        })
    }
}
impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Chain")
            .field("nodes", &self.len())
            .field("quanta", &self.quanta())
            .finish()
    }
}
impl Drop for Chain {
    fn drop(&mut self) {
        // 長いチェインで再帰的なドロップがスタックを溢れさせないように、ループで解放する
        let mut next = self.head.take();
        while let Some(mut node) = next {
            next = node.next.take();
        }
    }
}

fn link_or_allocate<'a>(
    link: &'a mut Option<Box<QuantumSet>>,
    nodes: &mut u64,
    allocator: &mut QuantumAllocator,
) -> Result<&'a mut QuantumSet> {
    let node = match link.take() {
        Some(node) => node,
        None => {
            let node = track!(allocator.allocate_node())?;
            *nodes += 1;
            node
        }
    };
    let node: &mut QuantumSet = link.insert(node);
    Ok(node)
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use trackable::result::TestResult;

    use super::*;
    use crate::metrics::AllocatorMetrics;

    fn allocator(memory_limit: Option<u64>) -> QuantumAllocator {
        QuantumAllocator::new(AllocatorMetrics::new(&MetricBuilder::new()), memory_limit)
    }

    #[test]
    fn follow_extends_chain() -> TestResult {
        let mut allocator = allocator(None);
        let mut chain = Chain::new();
        assert!(chain.is_empty());
        assert!(chain.find(0).is_none());

        track!(chain.follow(0, &mut allocator))?;
        assert_eq!(chain.len(), 1);

        track!(chain.follow(3, &mut allocator))?;
        assert_eq!(chain.len(), 4);
        assert!(chain.find(3).is_some());
        assert!(chain.find(4).is_none());

        // 既存ノードを辿るだけの場合には、新規割当は発生しない
        track!(chain.follow(2, &mut allocator))?;
        assert_eq!(chain.len(), 4);

        assert_eq!(chain.release(&mut allocator), 4);
        assert!(chain.is_empty());
        assert_eq!(allocator.usage_bytes(), 0);
        Ok(())
    }

    #[test]
    fn quantum_or_allocate_works() -> TestResult {
        let geometry = track!(Geometry::new(4, 2))?;
        let mut allocator = allocator(None);
        let mut chain = Chain::new();

        let node = track!(chain.follow(1, &mut allocator))?;
        assert!(node.quantum(1).is_none());

        let quantum = track!(node.quantum_or_allocate(1, geometry, &mut allocator))?;
        assert_eq!(quantum.len(), 4);
        quantum.copy_from_slice(b"abcd");

        assert_eq!(chain.find(1).and_then(|n| n.quantum(1)), Some(&b"abcd"[..]));
        assert_eq!(chain.find(1).and_then(|n| n.quantum(0)), None);
        assert_eq!(chain.find(0).map(QuantumSet::quanta), Some(0));
        assert_eq!(chain.quanta(), 1);
        Ok(())
    }

    #[test]
    fn extension_beyond_limit_links_nothing() -> TestResult {
        let node_size = std::mem::size_of::<QuantumSet>() as u64;
        let mut allocator = allocator(Some(node_size * 3));
        let mut chain = Chain::new();
        track!(chain.follow(0, &mut allocator))?;

        // 残り二つ分の余地しかないので、五つ追加する要求は何も連結せずに失敗する
        let e = chain.follow(5, &mut allocator).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::OutOfMemory));
        assert_eq!(chain.len(), 1);
        assert_eq!(allocator.usage_bytes(), node_size);

        track!(chain.follow(2, &mut allocator))?;
        assert_eq!(chain.len(), 3);

        // 既存ノードの範囲内なら上限に達していても辿れる
        track!(chain.follow(1, &mut allocator))?;
        assert_eq!(chain.len(), 3);
        Ok(())
    }

    #[test]
    fn dropping_long_chain_works() -> TestResult {
        let mut allocator = allocator(None);
        let mut chain = Chain::new();
        track!(chain.follow(100_000, &mut allocator))?;
        assert_eq!(chain.len(), 100_001);
        Ok(())
    }
}
