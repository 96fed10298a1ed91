use fibers::sync::oneshot;
use futures::{Async, Future};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 割り込み用のチャンネルを生成する.
///
/// `InterruptSignal`を付与して発行したリクエストは、
/// それがデバイスで実行開始される前に`Interrupter::interrupt`が呼ばれた場合には、
/// 一切実行されずに`ErrorKind::Interrupted`エラーで終了する.
///
/// 既に実行が開始されている場合には割り込みは無視され、通常通りの結果が返される.
pub fn interrupt_channel() -> (Interrupter, InterruptSignal) {
    let (tx, rx) = oneshot::channel();
    (Interrupter(tx), InterruptSignal(rx))
}

/// リクエストの待機を中断させるためのオブジェクト.
#[derive(Debug)]
pub struct Interrupter(oneshot::Sender<()>);
impl Interrupter {
    /// 対応するリクエストの待機を中断させる.
    pub fn interrupt(self) {
        let _ = self.0.send(());
    }
}

/// `Interrupter`からの割り込みを受け取るためのオブジェクト.
#[derive(Debug)]
pub struct InterruptSignal(oneshot::Receiver<()>);
impl InterruptSignal {
    /// 割り込みが発生したかどうかを確認する.
    ///
    /// `Some(true)`なら割り込み済み、`Some(false)`なら未発生.
    /// `Interrupter`が割り込みを行わずに破棄された場合には`None`が返される.
    pub(crate) fn poll_interrupted(&mut self) -> Option<bool> {
        match self.0.poll() {
            Ok(Async::Ready(())) => Some(true),
            Ok(Async::NotReady) => Some(false),
            Err(_) => None,
        }
    }
}

const PENDING: usize = 0;
const RUNNING: usize = 1;
const ABANDONED: usize = 2;

/// コマンドが「実行される」か「放棄される」かを排他的に決定するためのチケット.
///
/// デバイススレッドは`start`に成功した場合にのみコマンドを実行し、
/// 要求元は`abandon`に成功した場合にのみ`ErrorKind::Interrupted`を返す.
#[derive(Debug, Clone)]
pub(crate) struct Ticket(Arc<AtomicUsize>);
impl Ticket {
    pub fn new() -> Self {
        Ticket(Arc::new(AtomicUsize::new(PENDING)))
    }

    /// 実行を開始する.
    ///
    /// 既に放棄されている場合には`false`が返される.
    pub fn start(&self) -> bool {
        self.0
            .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// 実行待ちを放棄する.
    ///
    /// 既に実行が開始されている場合には`false`が返される.
    pub fn abandon(&self) -> bool {
        self.0
            .compare_exchange(PENDING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst) == ABANDONED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_works() {
        let ticket = Ticket::new();
        assert!(ticket.start());
        assert!(!ticket.abandon());
        assert!(!ticket.is_abandoned());

        let ticket = Ticket::new();
        assert!(ticket.clone().abandon());
        assert!(ticket.is_abandoned());
        assert!(!ticket.start());
    }
}
