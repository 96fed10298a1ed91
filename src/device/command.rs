//! デバイスに発行されるコマンド群の定義.
use fibers::sync::oneshot;
use futures::{Async, Future, Poll};
use std::sync::mpsc::{Receiver, Sender};
use trackable::error::ErrorKindExt;

use super::interrupt::{InterruptSignal, Ticket};
use crate::buffer::BufferStat;
use crate::deadline::Deadline;
use crate::file::AccessMode;
use crate::{Error, ErrorKind, Result};

pub type CommandSender = Sender<Command>;
pub type CommandReceiver = Receiver<Command>;

#[derive(Debug)]
pub enum Command {
    Read(ReadBytes),
    Write(WriteBytes),
    Trim(TrimBuffer),
    Open(OpenBuffer),
    Release(ReleaseBuffer),
    Stat(StatBuffer),
    Stop(StopDevice),
}
impl Command {
    pub fn deadline(&self) -> Deadline {
        match *self {
            Command::Read(ref c) => c.deadline,
            Command::Write(ref c) => c.deadline,
            Command::Trim(ref c) => c.deadline,
            Command::Open(ref c) => c.deadline,
            Command::Release(ref c) => c.deadline,
            Command::Stat(ref c) => c.deadline,
            Command::Stop(ref c) => c.deadline,
        }
    }

    /// コマンドの実行を開始する.
    ///
    /// 要求元が既に待機を放棄している場合には`false`が返され、
    /// その場合にはコマンドを実行してはならない.
    pub fn start(&self) -> bool {
        match self.ticket() {
            Some(ticket) => ticket.start(),
            None => true,
        }
    }

    /// 要求元が既に待機を放棄しているかどうかを判定する.
    pub fn is_abandoned(&self) -> bool {
        self.ticket().map_or(false, Ticket::is_abandoned)
    }

    pub fn failed(self, error: Error) {
        match self {
            Command::Read(c) => c.reply.send(Err(error)),
            Command::Write(c) => c.reply.send(Err(error)),
            Command::Trim(c) => c.reply.send(Err(error)),
            Command::Open(c) => c.reply.send(Err(error)),
            Command::Release(c) => c.reply.send(Err(error)),
            Command::Stat(c) => c.reply.send(Err(error)),
            Command::Stop(_) => {}
        }
    }

    fn ticket(&self) -> Option<&Ticket> {
        match *self {
            Command::Read(ref c) => Some(&c.reply.ticket),
            Command::Write(ref c) => Some(&c.reply.ticket),
            Command::Trim(ref c) => Some(&c.reply.ticket),
            Command::Open(ref c) => Some(&c.reply.ticket),
            Command::Release(ref c) => Some(&c.reply.ticket),
            Command::Stat(ref c) => Some(&c.reply.ticket),
            Command::Stop(_) => None,
        }
    }
}

/// `Result`の非同期版.
///
/// このインスタンスが、結果を受け取る前に破棄された場合には、
/// 対応するコマンドは(まだ実行されていなければ)放棄される.
#[derive(Debug)]
pub struct AsyncResult<T> {
    monitor: oneshot::Monitor<T, Error>,
    ticket: Ticket,
    signal: Option<InterruptSignal>,
}
impl<T> AsyncResult<T> {
    fn new() -> (AsyncReply<T>, Self) {
        let (tx, rx) = oneshot::monitor();
        let ticket = Ticket::new();
        let reply = AsyncReply {
            monitored: tx,
            ticket: ticket.clone(),
        };
        let result = AsyncResult {
            monitor: rx,
            ticket,
            signal: None,
        };
        (reply, result)
    }

    /// 割り込みを受け付けるようにする.
    pub(crate) fn interrupt_on(&mut self, signal: InterruptSignal) {
        self.signal = Some(signal);
    }
}
impl<T> Future for AsyncResult<T> {
    type Item = T;
    type Error = Error;
    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        let polled = track!(self.monitor.poll().map_err(|e| e.unwrap_or_else(|| {
            ErrorKind::DeviceTerminated
                .cause("monitoring channel disconnected")
                .into()
        })))?;
        if let Async::Ready(item) = polled {
            return Ok(Async::Ready(item));
        }

        match self.signal.as_mut().and_then(|s| s.poll_interrupted()) {
            Some(false) => {}
            Some(true) => {
                self.signal = None;
                if self.ticket.abandon() {
                    track_panic!(ErrorKind::Interrupted, "The request was interrupted");
                }
                // 既に実行が始まっているので、結果を待つ
            }
            None => {
                self.signal = None;
            }
        }
        Ok(Async::NotReady)
    }
}
impl<T> Drop for AsyncResult<T> {
    fn drop(&mut self) {
        self.ticket.abandon();
    }
}

#[derive(Debug)]
struct AsyncReply<T> {
    monitored: oneshot::Monitored<T, Error>,
    ticket: Ticket,
}
impl<T> AsyncReply<T> {
    fn send(self, result: Result<T>) {
        self.monitored.exit(result);
    }
}

#[derive(Debug)]
pub struct ReadBytes {
    position: u64,
    length: usize,
    deadline: Deadline,
    reply: AsyncReply<Vec<u8>>,
}
impl ReadBytes {
    pub fn new(position: u64, length: usize, deadline: Deadline) -> (Self, AsyncResult<Vec<u8>>) {
        let (reply, result) = AsyncResult::new();
        let command = ReadBytes {
            position,
            length,
            deadline,
            reply,
        };
        (command, result)
    }
    pub fn position(&self) -> u64 {
        self.position
    }
    pub fn length(&self) -> usize {
        self.length
    }
    pub fn reply(self, result: Result<Vec<u8>>) {
        self.reply.send(result);
    }
}

#[derive(Debug)]
pub struct WriteBytes {
    position: u64,
    data: Vec<u8>,
    deadline: Deadline,
    reply: AsyncReply<usize>,
}
impl WriteBytes {
    pub fn new(position: u64, data: Vec<u8>, deadline: Deadline) -> (Self, AsyncResult<usize>) {
        let (reply, result) = AsyncResult::new();
        let command = WriteBytes {
            position,
            data,
            deadline,
            reply,
        };
        (command, result)
    }
    pub fn position(&self) -> u64 {
        self.position
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn reply(self, result: Result<usize>) {
        self.reply.send(result);
    }
}

#[derive(Debug)]
pub struct TrimBuffer {
    deadline: Deadline,
    reply: AsyncReply<()>,
}
impl TrimBuffer {
    pub fn new(deadline: Deadline) -> (Self, AsyncResult<()>) {
        let (reply, result) = AsyncResult::new();
        let command = TrimBuffer { deadline, reply };
        (command, result)
    }
    pub fn reply(self, result: Result<()>) {
        self.reply.send(result);
    }
}

#[derive(Debug)]
pub struct OpenBuffer {
    mode: AccessMode,
    deadline: Deadline,
    reply: AsyncReply<()>,
}
impl OpenBuffer {
    pub fn new(mode: AccessMode, deadline: Deadline) -> (Self, AsyncResult<()>) {
        let (reply, result) = AsyncResult::new();
        let command = OpenBuffer {
            mode,
            deadline,
            reply,
        };
        (command, result)
    }
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
    pub fn reply(self, result: Result<()>) {
        self.reply.send(result);
    }
}

#[derive(Debug)]
pub struct ReleaseBuffer {
    deadline: Deadline,
    reply: AsyncReply<()>,
}
impl ReleaseBuffer {
    pub fn new(deadline: Deadline) -> (Self, AsyncResult<()>) {
        let (reply, result) = AsyncResult::new();
        let command = ReleaseBuffer { deadline, reply };
        (command, result)
    }
    pub fn reply(self, result: Result<()>) {
        self.reply.send(result);
    }
}

#[derive(Debug)]
pub struct StatBuffer {
    deadline: Deadline,
    reply: AsyncReply<BufferStat>,
}
impl StatBuffer {
    pub fn new(deadline: Deadline) -> (Self, AsyncResult<BufferStat>) {
        let (reply, result) = AsyncResult::new();
        let command = StatBuffer { deadline, reply };
        (command, result)
    }
    pub fn reply(self, result: Result<BufferStat>) {
        self.reply.send(result);
    }
}

#[derive(Debug)]
pub struct StopDevice {
    deadline: Deadline,
}
impl StopDevice {
    pub fn new(deadline: Deadline) -> Self {
        StopDevice { deadline }
    }
}
