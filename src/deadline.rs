//! デバイスに発行されるリクエストのデッドライン.
use std::time::Duration;

/// リクエストのデッドライン.
///
/// デバイスのキュー内では、デッドラインが近いものから順に実行される.
/// デッドラインが等しいリクエスト同士は、発行順(FIFO)に実行される.
///
/// なお、デッドラインはあくまでも優先順位付けのために使われるもので、
/// それを過ぎたリクエストが破棄されることはない.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deadline {
    /// 即座に実行されるべきリクエスト.
    Immediate,

    /// 指定時間以内に実行されるべきリクエスト.
    Within(Duration),

    /// デッドラインなし.
    ///
    /// `Deadline::default()`で使われる値.
    Infinity,
}
impl Default for Deadline {
    fn default() -> Self {
        Deadline::Infinity
    }
}
