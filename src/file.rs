//! デバイスを`std::io`のファイルとして扱うためのアダプタ.
//!
//! [DeviceFile]はファイル位置(カーソル)を保持し、
//! `std::io::{Read, Write, Seek}`の各呼び出しを、一つのデバイスリクエストに変換する.
//! 各リクエストは[fibers_global]のエグゼキュータ上で実行され、
//! その完了までの間、呼び出し元のスレッドはブロックされる.
//!
//! ブロッキングな呼び出しなので、ファイバー内(e.g., `fibers_global::spawn`で起動したタスク)からは使用しないこと.
//!
//! 一回の読み書きで転送されるのは最大でも一つの量子の範囲内なので、
//! 任意の範囲を扱いたい場合には`read_exact`や`write_all`等を使用すること.
//!
//! [DeviceFile]: struct.DeviceFile.html
//! [fibers_global]: https://docs.rs/fibers_global/0.1
use futures::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::deadline::Deadline;
use crate::device::DeviceHandle;
use crate::{Error, ErrorKind, Result};

/// ファイルのオープンモード.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// 読み込み専用.
    ReadOnly,

    /// 書き込み専用.
    ///
    /// このモードでオープンすると、デバイスのバッファは空にされる.
    WriteOnly,

    /// 読み書き両用.
    ReadWrite,
}
impl AccessMode {
    /// 読み込みが可能なモードかどうか.
    pub fn is_readable(self) -> bool {
        self != AccessMode::WriteOnly
    }

    /// 書き込みが可能なモードかどうか.
    pub fn is_writable(self) -> bool {
        self != AccessMode::ReadOnly
    }

    /// オープン時にバッファを空にするモードかどうか.
    pub fn truncates(self) -> bool {
        self == AccessMode::WriteOnly
    }
}

/// オープン済みのデバイス.
///
/// インスタンスが破棄される際には、デバイスに対して解放リクエストが発行される.
///
/// # 注意
///
/// 一度も書き込まれていない量子(穴)の読み込みは`0`バイトとなるため、
/// `Read`の利用者からはファイルの終端と区別できない.
///
/// # Examples
///
/// ```
/// # extern crate fibers_global;
/// # extern crate scull;
/// use scull::buffer::BufferBuilder;
/// use scull::device::DeviceBuilder;
/// use scull::file::{AccessMode, DeviceFile};
/// use std::io::{Read, Seek, SeekFrom, Write};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let device = DeviceBuilder::new().spawn(|| BufferBuilder::new().quantum_size(4).build());
/// let device = fibers_global::execute(device.wait_for_running())?;
///
/// let mut file = DeviceFile::open(device.handle(), AccessMode::ReadWrite)?;
/// file.write_all(b"Hello World!")?;
/// file.seek(SeekFrom::Start(6))?;
///
/// let mut buf = String::new();
/// file.read_to_string(&mut buf)?;
/// assert_eq!(buf, "World!");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DeviceFile {
    handle: DeviceHandle,
    mode: AccessMode,
    position: u64,
    deadline: Deadline,
    is_released: bool,
}
impl DeviceFile {
    /// デバイスを指定のモードでオープンする.
    ///
    /// `AccessMode::WriteOnly`の場合には、デバイスのバッファは空にされる.
    ///
    /// デバイスが起動中の場合には、起動の完了を待ってからオープンする.
    pub fn open(handle: DeviceHandle, mode: AccessMode) -> Result<Self> {
        let future = handle.request().wait_for_running().open(mode);
        track!(block_on(future), "mode={:?}", mode)?;
        Ok(DeviceFile {
            handle,
            mode,
            position: 0,
            deadline: Deadline::default(),
            is_released: false,
        })
    }

    /// オープンモードを返す.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// 現在のファイル位置を返す.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// 以降に発行するリクエストのデッドラインを設定する.
    ///
    /// デフォルト値は`Deadline::Infinity`.
    pub fn set_deadline(&mut self, deadline: Deadline) {
        self.deadline = deadline;
    }

    /// ファイルをクローズする.
    ///
    /// インスタンスを破棄した場合と異なり、解放リクエストの結果を取得することができる.
    pub fn close(mut self) -> Result<()> {
        self.is_released = true;
        track!(block_on(self.handle.request().deadline(self.deadline).release()))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        track_assert!(
            self.mode.is_readable(),
            ErrorKind::InvalidInput,
            "Not readable: mode={:?}",
            self.mode
        );
        if buf.is_empty() {
            return Ok(0);
        }
        let future = self
            .handle
            .request()
            .deadline(self.deadline)
            .read(self.position, buf.len());
        let bytes = track!(block_on(future), "position={}", self.position)?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        self.position += bytes.len() as u64;
        Ok(bytes.len())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        track_assert!(
            self.mode.is_writable(),
            ErrorKind::InvalidInput,
            "Not writable: mode={:?}",
            self.mode
        );
        if buf.is_empty() {
            return Ok(0);
        }
        let future = self
            .handle
            .request()
            .deadline(self.deadline)
            .write(self.position, buf.to_vec());
        let written = track!(block_on(future), "position={}", self.position)?;
        self.position += written as u64;
        Ok(written)
    }

    fn seek_position(&mut self, pos: SeekFrom) -> Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(n) => (n, 0),
            SeekFrom::Current(n) => (self.position, n),
            SeekFrom::End(n) => {
                let future = self.handle.request().deadline(self.deadline).stat();
                let stat = track!(block_on(future))?;
                (stat.size, n)
            }
        };
        let position = if delta < 0 {
            base.checked_sub(delta.wrapping_neg() as u64)
        } else {
            base.checked_add(delta as u64)
        };
        match position {
            None => track_panic!(ErrorKind::InvalidInput, "base={}, delta={}", base, delta),
            Some(position) => {
                self.position = position;
                Ok(position)
            }
        }
    }
}
/// `future`をエグゼキュータ上で実行して、その結果を待つ.
///
/// 結果を受け取る`AsyncResult`はファイバーからの通知しか受け取れないので、
/// `Future::wait`を使ってはいけない.
fn block_on<F>(future: F) -> Result<F::Item>
where
    F: Future<Error = Error> + Send + 'static,
    F::Item: Send + 'static,
{
    track!(fibers_global::execute(future))
}

impl Read for DeviceFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        track!(self.read_bytes(buf)).map_err(io::Error::from)
    }
}
impl Write for DeviceFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        track!(self.write_bytes(buf)).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
impl Seek for DeviceFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        track!(self.seek_position(pos)).map_err(io::Error::from)
    }
}
impl Drop for DeviceFile {
    fn drop(&mut self) {
        if !self.is_released {
            let future = self.handle.request().deadline(self.deadline).release();
            let _ = block_on(future);
        }
    }
}

#[cfg(test)]
mod tests {
    use fibers_global::execute;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::sync::mpsc;
    use std::thread;
    use trackable::result::TestResult;

    use super::*;
    use crate::buffer::BufferBuilder;
    use crate::device::{Device, DeviceBuilder};

    fn spawn_device() -> Result<Device> {
        let device = DeviceBuilder::new()
            .spawn(|| track!(BufferBuilder::new().quantum_size(4).qset_size(2).build()));
        track!(execute(device.wait_for_running()))
    }

    #[test]
    fn access_mode_works() {
        assert!(AccessMode::ReadOnly.is_readable());
        assert!(!AccessMode::ReadOnly.is_writable());
        assert!(!AccessMode::ReadOnly.truncates());

        assert!(!AccessMode::WriteOnly.is_readable());
        assert!(AccessMode::WriteOnly.is_writable());
        assert!(AccessMode::WriteOnly.truncates());

        assert!(AccessMode::ReadWrite.is_readable());
        assert!(AccessMode::ReadWrite.is_writable());
        assert!(!AccessMode::ReadWrite.truncates());
    }

    #[test]
    fn write_all_and_read_to_end_works() -> TestResult {
        let device = track!(spawn_device())?;
        let data = (0..100).map(|i| i as u8).collect::<Vec<_>>();

        let mut file = track!(DeviceFile::open(device.handle(), AccessMode::ReadWrite))?;
        track_io!(file.write_all(&data))?;
        assert_eq!(file.position(), 100);

        // 一回の書き込みは量子の末尾で打ち切られる
        track_io!(file.seek(SeekFrom::Start(6)))?;
        assert_eq!(track_io!(file.write(b"xyz"))?, 2);

        track_io!(file.seek(SeekFrom::Start(0)))?;
        let mut buf = Vec::new();
        track_io!(file.read_to_end(&mut buf))?;
        let mut expected = data.clone();
        expected[6..8].copy_from_slice(b"xy");
        assert_eq!(buf, expected);

        let stat = track!(execute(device.handle().request().stat()))?;
        assert_eq!(stat.size, 100);
        assert_eq!(stat.nodes, 13);
        assert_eq!(stat.quanta, 25);
        track!(file.close())?;
        Ok(())
    }

    #[test]
    fn seek_works() -> TestResult {
        let device = track!(spawn_device())?;
        let mut file = track!(DeviceFile::open(device.handle(), AccessMode::ReadWrite))?;
        track_io!(file.write_all(b"0123456789"))?;

        assert_eq!(track_io!(file.seek(SeekFrom::End(-3)))?, 7);
        let mut buf = [0; 3];
        track_io!(file.read_exact(&mut buf))?;
        assert_eq!(&buf, b"789");

        assert_eq!(track_io!(file.seek(SeekFrom::Current(-8)))?, 2);
        track_io!(file.read_exact(&mut buf))?;
        assert_eq!(&buf, b"234");

        // サイズを超える位置への移動は可能だが、そこからの読み込みは0バイトとなる
        assert_eq!(track_io!(file.seek(SeekFrom::End(5)))?, 15);
        assert_eq!(track_io!(file.read(&mut buf))?, 0);

        // 負の位置への移動はエラー
        let e = file.seek(SeekFrom::Current(-100)).err().map(|e| e.kind());
        assert_eq!(e, Some(io::ErrorKind::InvalidInput));
        assert_eq!(file.position(), 15);
        Ok(())
    }

    #[test]
    fn access_mode_is_enforced() -> TestResult {
        let device = track!(spawn_device())?;
        {
            let mut file = track!(DeviceFile::open(device.handle(), AccessMode::ReadWrite))?;
            track_io!(file.write_all(b"foo"))?;
        }

        // 読み込み専用でのオープンは内容に影響せず、書き込みは拒否される
        let mut file = track!(DeviceFile::open(device.handle(), AccessMode::ReadOnly))?;
        let e = file.write(b"bar").err().map(|e| e.kind());
        assert_eq!(e, Some(io::ErrorKind::InvalidInput));
        let mut buf = String::new();
        track_io!(file.read_to_string(&mut buf))?;
        assert_eq!(buf, "foo");
        track!(file.close())?;

        // 書き込み専用でのオープンは内容を空にし、読み込みは拒否される
        let mut file = track!(DeviceFile::open(device.handle(), AccessMode::WriteOnly))?;
        let e = file.read(&mut [0; 3]).err().map(|e| e.kind());
        assert_eq!(e, Some(io::ErrorKind::InvalidInput));
        assert_eq!(track_io!(file.seek(SeekFrom::End(0)))?, 0);
        drop(file);

        let metrics = device.handle().metrics().clone();
        assert_eq!(metrics.dequeued_commands().open(), 3);
        assert_eq!(metrics.dequeued_commands().release(), 3);
        Ok(())
    }

    #[test]
    fn open_waits_for_starting_device() -> TestResult {
        let (tx, rx) = mpsc::channel::<()>();
        let device = DeviceBuilder::new().spawn(move || {
            let _ = rx.recv();
            track!(BufferBuilder::new().quantum_size(4).qset_size(2).build())
        });
        let handle = device.handle();
        let opener = thread::spawn(move || -> Result<u64> {
            let mut file = track!(DeviceFile::open(handle, AccessMode::ReadWrite))?;
            track!(file.write_bytes(b"abc"))?;
            track!(file.seek_position(SeekFrom::End(0)))
        });

        tx.send(()).unwrap();
        let size = track!(opener.join().unwrap())?;
        assert_eq!(size, 3);
        assert_eq!(device.handle().metrics().dequeued_commands().open(), 1);
        Ok(())
    }

    #[test]
    fn many_small_requests_complete() -> TestResult {
        let device = track!(spawn_device())?;
        let mut file = track!(DeviceFile::open(device.handle(), AccessMode::ReadWrite))?;
        for i in 0..200u64 {
            track_io!(file.seek(SeekFrom::Start(i)))?;
            assert_eq!(track_io!(file.write(&[i as u8]))?, 1);
        }
        track_io!(file.seek(SeekFrom::Start(0)))?;
        let mut buf = Vec::new();
        track_io!(file.read_to_end(&mut buf))?;
        assert_eq!(buf, (0..200u64).map(|i| i as u8).collect::<Vec<_>>());
        track!(file.close())?;
        Ok(())
    }
}
