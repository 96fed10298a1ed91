//! デバイスの幾何情報(量子サイズおよび量子集合サイズ)と、オフセットの座標変換.
use crate::{ErrorKind, Result};

/// 量子サイズ(バイト単位)のデフォルト値.
pub const DEFAULT_QUANTUM_SIZE: usize = 4000;

/// 量子集合のスロット数のデフォルト値.
pub const DEFAULT_QSET_SIZE: usize = 1000;

/// デバイスの幾何情報.
///
/// 一つの量子集合(ノード)は`qset_size`個の量子スロットを持ち、
/// 各量子は`quantum_size`バイトの領域を保持する.
///
/// 従って、一つのノードは`quantum_size * qset_size`バイト分のオフセット空間("アイテム")を担当する.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    quantum_size: usize,
    qset_size: usize,
}
impl Geometry {
    /// 指定されたサイズを持つ`Geometry`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `quantum_size`ないし`qset_size`が`0`
    /// - アイテムサイズ(`quantum_size * qset_size`)が`u64`に収まらない
    ///
    /// # Examples
    ///
    /// ```
    /// use scull::ErrorKind;
    /// use scull::geometry::Geometry;
    ///
    /// let geometry = Geometry::new(4, 2).unwrap();
    /// assert_eq!(geometry.item_size(), 8);
    ///
    /// assert_eq!(Geometry::new(0, 2).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(Geometry::new(4, 0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(quantum_size: usize, qset_size: usize) -> Result<Self> {
        track_assert_ne!(quantum_size, 0, ErrorKind::InvalidInput);
        track_assert_ne!(qset_size, 0, ErrorKind::InvalidInput);
        track_assert!(
            (quantum_size as u64)
                .checked_mul(qset_size as u64)
                .is_some(),
            ErrorKind::InvalidInput; quantum_size, qset_size
        );
        Ok(Geometry {
            quantum_size,
            qset_size,
        })
    }

    /// 量子のサイズ(バイト単位)を返す.
    pub fn quantum_size(self) -> usize {
        self.quantum_size
    }

    /// 量子集合が保持するスロット数を返す.
    pub fn qset_size(self) -> usize {
        self.qset_size
    }

    /// 一つの量子集合が担当するバイト数を返す.
    pub fn item_size(self) -> u64 {
        self.quantum_size as u64 * self.qset_size as u64
    }

    /// 論理オフセットを、チェイン上の座標に変換する.
    ///
    /// # Examples
    ///
    /// ```
    /// use scull::geometry::{Geometry, Position};
    ///
    /// let geometry = Geometry::new(4, 2).unwrap();
    /// assert_eq!(geometry.locate(0), Position { item: 0, slot: 0, offset: 0 });
    /// assert_eq!(geometry.locate(6), Position { item: 0, slot: 1, offset: 2 });
    /// assert_eq!(geometry.locate(8), Position { item: 1, slot: 0, offset: 0 });
    /// assert_eq!(geometry.locate(21), Position { item: 2, slot: 1, offset: 1 });
    /// ```
    pub fn locate(self, position: u64) -> Position {
        let item_size = self.item_size();
        let quantum_size = self.quantum_size as u64;
        let rest = position % item_size;
        Position {
            item: position / item_size,
            slot: (rest / quantum_size) as usize,
            offset: (rest % quantum_size) as usize,
        }
    }

    /// 指定位置から、その位置を含む量子の末尾までの残りバイト数を返す.
    ///
    /// 一回の読み書きで転送されるバイト数は、この値を超えることはない.
    ///
    /// # Examples
    ///
    /// ```
    /// use scull::geometry::Geometry;
    ///
    /// let geometry = Geometry::new(4, 2).unwrap();
    /// assert_eq!(geometry.quantum_remaining(0), 4);
    /// assert_eq!(geometry.quantum_remaining(6), 2);
    /// assert_eq!(geometry.quantum_remaining(7), 1);
    /// ```
    pub fn quantum_remaining(self, position: u64) -> usize {
        self.quantum_size - self.locate(position).offset
    }
}
impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            quantum_size: DEFAULT_QUANTUM_SIZE,
            qset_size: DEFAULT_QSET_SIZE,
        }
    }
}

/// チェイン上の座標.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// 量子集合のチェイン上での位置(先頭が`0`).
    pub item: u64,

    /// 量子集合内のスロット位置.
    pub slot: usize,

    /// 量子内のバイトオフセット.
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn default_geometry_works() {
        let geometry = Geometry::default();
        assert_eq!(geometry.quantum_size(), DEFAULT_QUANTUM_SIZE);
        assert_eq!(geometry.qset_size(), DEFAULT_QSET_SIZE);
        assert_eq!(geometry.item_size(), 4_000_000);

        let position = geometry.locate(4_000_000 + 8_123);
        assert_eq!(
            position,
            Position {
                item: 1,
                slot: 2,
                offset: 123
            }
        );
    }

    #[test]
    fn large_offset_works() -> TestResult {
        let geometry = track!(Geometry::new(4000, 2))?;
        let position = geometry.locate(u64::MAX);
        assert_eq!(position.item, u64::MAX / 8000);
        assert_eq!(position.slot, ((u64::MAX % 8000) / 4000) as usize);
        assert_eq!(position.offset, ((u64::MAX % 8000) % 4000) as usize);
        Ok(())
    }

    #[test]
    fn overflowing_item_size_is_rejected() {
        if std::mem::size_of::<usize>() == 8 {
            let e = Geometry::new(usize::MAX, 2).err().map(|e| *e.kind());
            assert_eq!(e, Some(ErrorKind::InvalidInput));
        }
    }
}
