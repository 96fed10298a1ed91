use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::deadline::Deadline;
use crate::device::command::Command;

/// 実行待ちのコマンドを保持するキュー.
///
/// コマンドはデッドラインが近いものから順に取り出され、
/// デッドラインが等しいもの同士は、追加された順に取り出される.
///
/// このキューに入っている間が、バッファへの排他アクセスを待っている期間に相当する.
/// 要求元が待機を放棄したコマンドも、通常通りに取り出される点には注意.
#[derive(Debug)]
pub struct DeadlineQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seqno: u64,
}
impl DeadlineQueue {
    /// 空のキューを生成する.
    pub fn new() -> Self {
        DeadlineQueue {
            heap: BinaryHeap::new(),
            next_seqno: 0,
        }
    }

    /// コマンドを追加する.
    pub fn push(&mut self, command: Command) {
        let key = (AbsoluteDeadline::from(command.deadline()), self.next_seqno);
        self.next_seqno += 1;
        self.heap.push(Reverse(Entry { key, command }));
    }

    /// 次に実行すべきコマンドを取り出す.
    pub fn pop(&mut self) -> Option<Command> {
        self.heap.pop().map(|Reverse(entry)| entry.command)
    }

    /// 実行待ちのコマンド数を返す.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// 実行待ちのコマンドが存在しないかどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[derive(Debug)]
struct Entry {
    key: (AbsoluteDeadline, u64),
    command: Command,
}
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// 追加時刻を基準に絶対時刻へと変換されたデッドライン.
///
/// 列挙子の宣言順が、そのまま優先順位となる.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum AbsoluteDeadline {
    Immediate,
    At(Instant),
    Infinity,
}
impl From<Deadline> for AbsoluteDeadline {
    fn from(deadline: Deadline) -> Self {
        match deadline {
            Deadline::Immediate => AbsoluteDeadline::Immediate,
            Deadline::Within(duration) => AbsoluteDeadline::At(Instant::now() + duration),
            Deadline::Infinity => AbsoluteDeadline::Infinity,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::device::command::{AsyncResult, ReadBytes};

    fn push(queue: &mut DeadlineQueue, position: u64, deadline: Deadline) -> AsyncResult<Vec<u8>> {
        let (command, result) = ReadBytes::new(position, 1, deadline);
        queue.push(Command::Read(command));
        result
    }

    fn pop_position(queue: &mut DeadlineQueue) -> Option<u64> {
        queue.pop().map(|command| match command {
            Command::Read(c) => c.position(),
            _ => unreachable!(),
        })
    }

    #[test]
    fn deadline_order_works() {
        let mut queue = DeadlineQueue::new();
        assert!(queue.is_empty());

        // 結果を受け取る側を破棄すると放棄扱いになるので、最後まで保持しておく
        let _results = vec![
            push(&mut queue, 0, Deadline::Infinity),
            push(&mut queue, 1, Deadline::Immediate),
            push(&mut queue, 2, Deadline::Within(Duration::from_millis(1))),
            {
                thread::sleep(Duration::from_millis(5));
                push(&mut queue, 3, Deadline::Within(Duration::from_millis(0)))
            },
            push(&mut queue, 4, Deadline::Immediate),
        ];
        assert_eq!(queue.len(), 5);

        assert_eq!(pop_position(&mut queue), Some(1));
        assert_eq!(pop_position(&mut queue), Some(4)); // 同じデッドラインなら追加順
        assert_eq!(pop_position(&mut queue), Some(2));
        assert_eq!(pop_position(&mut queue), Some(3));
        assert_eq!(pop_position(&mut queue), Some(0));
        assert_eq!(pop_position(&mut queue), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn abandoned_command_is_still_dequeued() {
        let mut queue = DeadlineQueue::new();
        let result = push(&mut queue, 10, Deadline::Infinity);
        drop(result);

        let command = queue.pop();
        assert_eq!(command.as_ref().map(Command::is_abandoned), Some(true));
        assert_eq!(command.map(|c| c.start()), Some(false));
    }
}
