//! バッファを共有するためのデバイス.
//!
//! "デバイス"は[バッファ]への並行アクセスを管理するための構成要素である.
//!
//! 一つのデバイス(i.e., バッファ)には、一つの管理スレッドが割り当てられて、
//! そのデバイスに対するリクエストは全て直列化されて処理される.
//! そのため、各読み書き操作は、他の全ての操作に対して排他的に実行されることが保証される.
//!
//! 並行するリクエスト群が存在する場合には、指定された優先順位(デッドライン)に基づいて
//! スケジューリングが行われる.
//! 順番待ちをしているリクエストは、[割り込み]によって待機を中断することが可能.
//!
//! [バッファ]: ../buffer/index.html
//! [割り込み]: fn.interrupt_channel.html
use futures::{Async, Future, Poll};
use std::sync::Arc;

pub use self::builder::DeviceBuilder;
pub use self::interrupt::{interrupt_channel, InterruptSignal, Interrupter};
pub use self::request::DeviceRequest;

pub(crate) use self::command::Command; // `metrics`モジュール用に公開されている

use self::thread::{DeviceThreadHandle, DeviceThreadMonitor};
use crate::buffer::DeviceBuffer;
use crate::deadline::Deadline;
use crate::metrics::DeviceMetrics;
use crate::{Error, Result};

mod builder;
mod command;
mod interrupt;
mod queue;
mod request;
mod thread;

/// [バッファ]を専有する管理スレッドと、その終了を監視するための`Future`の組.
///
/// 管理スレッドは`Future::poll`とは無関係に動作するので、ポーリングは必須ではない.
/// ただしスレッドの正常終了や異常終了を知りたい場合には、この`Future`の完了を待つ必要がある.
///
/// インスタンスが破棄されるとデバイスも停止するので、
/// デバイスを使い続ける間は、このインスタンスを保持しておくこと.
///
/// [バッファ]: ../buffer/index.html
#[must_use]
#[derive(Debug)]
pub struct Device {
    monitor: DeviceThreadMonitor,
    handle: DeviceHandle,
    exited: bool,
}
impl Device {
    /// `DeviceBuilder`のデフォルト設定でデバイスを起動する.
    pub fn spawn<F>(init_buffer: F) -> Device
    where
        F: FnOnce() -> Result<DeviceBuffer> + Send + 'static,
    {
        DeviceBuilder::new().spawn(init_buffer)
    }

    /// デバイスを操作するためのハンドルを返す.
    pub fn handle(&self) -> DeviceHandle {
        self.handle.clone()
    }

    /// デバイスの停止を要求する.
    ///
    /// 停止コマンドも他のコマンドと同様に`deadline`に従ってキューから取り出される.
    /// その時点でキューに残っているリクエストは、`ErrorKind::DeviceTerminated`で失敗する.
    ///
    /// 停止の完了はこのインスタンスの`Future`実装を通して検知する.
    /// 稼働中のまま破棄された場合には`stop(Deadline::Immediate)`が呼ばれる.
    pub fn stop(&self, deadline: Deadline) {
        self.handle.request().deadline(deadline).stop();
    }

    /// 初期化の完了後に、自分自身を返す`Future`を生成する.
    pub fn wait_for_running(self) -> impl Future<Item = Self, Error = Error> {
        let probe = self.handle.request().wait_for_running().stat();
        track_err!(probe.map(move |_| self))
    }

    pub(crate) fn new(monitor: DeviceThreadMonitor, handle: DeviceHandle) -> Self {
        Device {
            monitor,
            handle,
            exited: false,
        }
    }
}
impl Future for Device {
    type Item = ();
    type Error = Error;
    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        let polled = track!(self.monitor.poll());
        match polled {
            Ok(Async::NotReady) => {}
            _ => self.exited = true,
        }
        polled
    }
}
impl Drop for Device {
    fn drop(&mut self) {
        if !self.exited {
            self.stop(Deadline::Immediate);
        }
    }
}

/// デバイスを操作するためのハンドル.
#[derive(Debug, Clone)]
pub struct DeviceHandle(DeviceThreadHandle);
impl DeviceHandle {
    /// 新しいリクエストのビルダを返す.
    pub fn request(&self) -> DeviceRequest<'_> {
        DeviceRequest::new(&self.0)
    }

    /// キュー長やコマンド数などのメトリクスを返す.
    pub fn metrics(&self) -> &Arc<DeviceMetrics> {
        self.0.metrics()
    }
}

/// デバイスの稼働状態.
///
/// 値は`DeviceMetrics`のステータスゲージにそのまま記録される.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// 管理スレッド上でバッファを初期化している.
    Starting = 1,

    /// リクエストを処理できる.
    Running = 2,

    /// 管理スレッドが終了した.
    Stopped = 0,
}
