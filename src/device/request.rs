use futures::Future;

use super::thread::DeviceThreadHandle;
use crate::buffer::BufferStat;
use crate::deadline::Deadline;
use crate::device::command::{self, AsyncResult, Command};
use crate::device::{DeviceStatus, InterruptSignal};
use crate::file::AccessMode;
use crate::{Error, ErrorKind, Result};

/// デバイスに対してリクエストを発行するためのビルダ.
///
/// オプション系のメソッドで設定を行った後に、操作系のメソッドでリクエストを発行する.
/// 発行されたリクエストは、デバイスへの排他アクセスを獲得した時点で実行される.
///
/// 排他アクセスを待っている間(i.e., デバイスのキュー内にある間)に、
/// `interrupt_on`で指定した割り込みが発生した場合には、そのリクエストは実行されない.
///
/// 結果を受け取る`Future`は[`fibers`]上で実行されることを想定している.
///
/// [`fibers`]: https://github.com/dwango/fibers-rs
#[derive(Debug)]
pub struct DeviceRequest<'a> {
    device: &'a DeviceThreadHandle,
    deadline: Option<Deadline>,
    max_queue_len: Option<usize>,
    wait_for_running: bool,
    interrupt: Option<InterruptSignal>,
}
impl<'a> DeviceRequest<'a> {
    pub(crate) fn new(device: &'a DeviceThreadHandle) -> Self {
        DeviceRequest {
            device,
            deadline: None,
            max_queue_len: None,
            wait_for_running: false,
            interrupt: None,
        }
    }

    /// `position`から、最大で`length`バイトを読み込む.
    ///
    /// 一回の読み込みで返されるのは、最大でも一つの量子の範囲内のバイト列である.
    /// 読み込み位置がバッファサイズ以上の場合や、
    /// 一度も書き込まれていない量子を指している場合には、空のバイト列が返される.
    pub fn read(
        &mut self,
        position: u64,
        length: usize,
    ) -> impl Future<Item = Vec<u8>, Error = Error> {
        let deadline = self.deadline.unwrap_or_default();
        let (command, response) = command::ReadBytes::new(position, length, deadline);
        self.send_command(Command::Read(command), response)
    }

    /// `position`に`data`を書き込む.
    ///
    /// 実際に書き込まれたバイト数が結果として返される.
    /// 書き込みは量子の末尾で打ち切られるので、`data.len()`未満になることがある.
    ///
    /// # Errors
    ///
    /// メモリの割当に失敗した場合には`ErrorKind::OutOfMemory`が返される.
    pub fn write(
        &mut self,
        position: u64,
        data: Vec<u8>,
    ) -> impl Future<Item = usize, Error = Error> {
        let deadline = self.deadline.unwrap_or_default();
        let (command, response) = command::WriteBytes::new(position, data, deadline);
        self.send_command(Command::Write(command), response)
    }

    /// バッファの全データを解放する.
    pub fn trim(&mut self) -> impl Future<Item = (), Error = Error> {
        let deadline = self.deadline.unwrap_or_default();
        let (command, response) = command::TrimBuffer::new(deadline);
        self.send_command(Command::Trim(command), response)
    }

    /// バッファをオープンする.
    ///
    /// `AccessMode::WriteOnly`が指定された場合には、バッファは空にされる.
    pub fn open(&mut self, mode: AccessMode) -> impl Future<Item = (), Error = Error> {
        let deadline = self.deadline.unwrap_or_default();
        let (command, response) = command::OpenBuffer::new(mode, deadline);
        self.send_command(Command::Open(command), response)
    }

    /// バッファをクローズする.
    ///
    /// バッファの内容には影響しない.
    pub fn release(&mut self) -> impl Future<Item = (), Error = Error> {
        let deadline = self.deadline.unwrap_or_default();
        let (command, response) = command::ReleaseBuffer::new(deadline);
        self.send_command(Command::Release(command), response)
    }

    /// バッファの状態を取得する.
    pub fn stat(&mut self) -> impl Future<Item = BufferStat, Error = Error> {
        let deadline = self.deadline.unwrap_or_default();
        let (command, response) = command::StatBuffer::new(deadline);
        self.send_command(Command::Stat(command), response)
    }

    /// デバイスに停止コマンドを送る.
    ///
    /// 停止できるのは`Device`の所有者のみなので、`Device::stop`経由でのみ呼び出される.
    pub(crate) fn stop(&self) {
        let deadline = self.deadline.unwrap_or_default();
        let command = Command::Stop(command::StopDevice::new(deadline));
        self.device.send_command(command);
    }

    /// キュー内での優先順位付けに使われるデッドラインを設定する.
    ///
    /// デフォルト値は`Deadline::Infinity`.
    pub fn deadline(&mut self, deadline: Deadline) -> &mut Self {
        self.deadline = Some(deadline);
        self
    }

    /// 次に発行するリクエストを、指定の割り込みで中断可能にする.
    ///
    /// リクエストの実行開始前に割り込みが発生した場合には、
    /// そのリクエストは実行されずに`ErrorKind::Interrupted`エラーで終了する.
    ///
    /// 割り込みは、次に発行される一つのリクエストにのみ適用される.
    pub fn interrupt_on(&mut self, signal: InterruptSignal) -> &mut Self {
        self.interrupt = Some(signal);
        self
    }

    /// 発行時点で許容されるキューの長さの上限を指定する.
    ///
    /// キューの長さが上限を超えている場合には、リクエストはキューに入れられずに
    /// `ErrorKind::DeviceBusy`で即座に失敗する.
    ///
    /// デフォルトは無制限.
    pub fn max_queue_len(&mut self, max: usize) -> &mut Self {
        self.max_queue_len = Some(max);
        self
    }

    /// デバイスが起動中の場合でも、リクエストをキューに入れるようにする.
    ///
    /// これを指定しない場合、起動中のデバイスへのリクエストは
    /// `ErrorKind::DeviceBusy`で即座に失敗する.
    pub fn wait_for_running(&mut self) -> &mut Self {
        self.wait_for_running = true;
        self
    }

    fn send_command<T>(&mut self, command: Command, mut response: AsyncResult<T>) -> AsyncResult<T> {
        if let Some(signal) = self.interrupt.take() {
            response.interrupt_on(signal);
        }
        match track!(self.check_acceptable()) {
            Ok(()) => self.device.send_command(command),
            Err(e) => {
                if *e.kind() == ErrorKind::DeviceBusy {
                    self.device.metrics().busy_commands.increment(&command);
                }
                command.failed(e);
            }
        }
        response
    }

    fn check_acceptable(&self) -> Result<()> {
        let metrics = self.device.metrics();
        if !self.wait_for_running && metrics.status() == DeviceStatus::Starting {
            track_panic!(ErrorKind::DeviceBusy, "The device is starting up");
        }
        track!(self.check_limit())
    }

    fn check_limit(&self) -> Result<()> {
        let metrics = self.device.metrics();
        if let Some(max) = self.max_queue_len {
            track_assert!(
                metrics.queue_len() <= max,
                ErrorKind::DeviceBusy,
                "value={}, max={}",
                metrics.queue_len(),
                max
            );
        }
        Ok(())
    }
}
