//! Simple Character Utility for Loading Localities.
//!
//! `scull`は、メモリ上に確保される、疎で成長可能なバイト列デバイス.
//!
//! # 特徴
//!
//! - データは固定長の[量子]単位で保持され、量子は固定長の[量子集合]に纏められる
//!   - 量子集合(ノード)は片方向に連結されたチェインを構成する
//!   - ノード、スロット配列、量子は、いずれも最初の書き込み時に遅延して割り当てられる
//! - 一回の読み書きで転送されるのは、最大でも一つの量子の範囲内のバイト列に限られる
//!   - 要求サイズに満たない転送は正常な結果であり、利用者は転送を繰り返すことで任意の範囲を扱う
//! - 書き込まれていない領域(穴)にはメモリが割り当てられない
//! - 一つの[device]には一つの管理スレッドが割り当てられ、全ての操作は直列化されて処理される
//!   - 順番待ちをしているリクエストは、割り込みによって中断することが可能
//! - 永続化は行わない
//!
//! # モジュールの依存関係
//!
//! ```text
//! file => device => buffer => geometry
//! ```
//!
//! - [file]モジュール:
//!   - [DeviceFile]を提供
//!   - デバイスを`std::io::{Read, Write, Seek}`として扱うためのアダプタ
//! - [device]モジュール:
//!   - 主に[Device]構造体を提供
//!   - [DeviceBuffer]を所有する管理スレッドを起動し、それに対するリクエスト群のスケジューリング等を担当する
//! - [buffer]モジュール:
//!   - 主に[DeviceBuffer]構造体を提供
//!   - 量子集合のチェインの管理と、それに対する同期的な読み書きを担当する
//! - [geometry]モジュール:
//!   - 量子サイズと量子集合サイズの組、およびバイトオフセットからの座標変換を提供
//!
//! [量子]: ./geometry/index.html
//! [量子集合]: ./geometry/index.html
//! [file]: ./file/index.html
//! [DeviceFile]: ./file/struct.DeviceFile.html
//! [device]: ./device/index.html
//! [Device]: ./device/struct.Device.html
//! [buffer]: ./buffer/index.html
//! [DeviceBuffer]: ./buffer/struct.DeviceBuffer.html
//! [geometry]: ./geometry/index.html
#![warn(missing_docs)]
#[cfg(feature = "device")]
extern crate fibers;
#[cfg(feature = "device")]
extern crate fibers_global;
#[cfg(feature = "device")]
extern crate futures;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

#[cfg(test)]
macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod buffer;
pub mod deadline;
#[cfg(feature = "device")]
pub mod device;
#[cfg(feature = "device")]
pub mod file;
pub mod geometry;
pub mod metrics;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
