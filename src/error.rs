use std;
use trackable;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else {
            match e.kind() {
                std::io::ErrorKind::InvalidInput => ErrorKind::InvalidInput.cause(e).into(),
                std::io::ErrorKind::Interrupted => ErrorKind::Interrupted.cause(e).into(),
                _ => ErrorKind::Other.cause(e).into(),
            }
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        let kind = match *e.kind() {
            ErrorKind::InvalidInput => std::io::ErrorKind::InvalidInput,
            ErrorKind::Interrupted => std::io::ErrorKind::Interrupted,
            ErrorKind::OutOfMemory => std::io::ErrorKind::OutOfMemory,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, e)
    }
}

/// エラーの種類.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// デバイスへの排他アクセスの待機が、割り込みによって中断された.
    ///
    /// このエラーが返された場合には、要求された操作は一切実行されていない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が同じ要求を再発行する
    Interrupted,

    /// 量子・量子集合・スロット配列のいずれかの割当に失敗した.
    ///
    /// 設定されたメモリ上限を超える場合や、システムのアロケータが要求を拒否した場合に返される.
    ///
    /// 失敗以前に連結済みの量子集合はそのまま残るが、デバイスは引き続き利用可能.
    ///
    /// # 典型的な対応策
    ///
    /// - 不要なデータをトリムしてから再試行する
    /// - メモリ上限を引き上げた上で、デバイスを作り直す
    OutOfMemory,

    /// デバイスがリクエストを受け付けられない.
    ///
    /// キュー長が制限を超えている場合と、バッファの初期化が終わっていない場合に返される.
    ///
    /// # 典型的な対応策
    ///
    /// - 少し待ってから同じリクエストを発行し直す
    /// - 起動直後であれば`DeviceRequest::wait_for_running`を指定する
    DeviceBusy,

    /// 管理スレッドが終了しているため、リクエストを処理できない.
    ///
    /// 停止の理由は問わない.
    /// 停止時にキューに残っていたリクエストも、このエラーで終了する.
    ///
    /// # 典型的な対応策
    ///
    /// - 新しいデバイスを起動する
    DeviceTerminated,

    /// 引数の値が範囲外である.
    ///
    /// サイズ0のジオメトリや、`u64`の範囲を超える位置指定が該当する.
    /// 読み込み専用でオープンしたファイルへの書き込みなど、アクセスモードの違反も含む.
    ///
    /// # 典型的な対応策
    ///
    /// - 呼び出し側で値を検証する
    InvalidInput,

    /// 量子集合の連結リストなど、内部のデータ構造が壊れている.
    ///
    /// 発生した場合はバグである.
    /// 書き込み中にこのエラーが起きると、デバイスは停止する.
    ///
    /// # 典型的な対応策
    ///
    /// - 原因を調査して修正する
    InconsistentState,

    /// その他エラー.
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion_works() {
        let e: Error = ErrorKind::Interrupted.cause("wait abandoned").into();
        let io = std::io::Error::from(e);
        assert_eq!(io.kind(), std::io::ErrorKind::Interrupted);

        // `io::Error`に包まれた`Error`は元の種別に戻る
        let e = Error::from(io);
        assert_eq!(*e.kind(), ErrorKind::Interrupted);

        let e: Error = ErrorKind::OutOfMemory.error().into();
        assert_eq!(
            std::io::Error::from(e).kind(),
            std::io::ErrorKind::OutOfMemory
        );

        let io = std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad offset");
        assert_eq!(*Error::from(io).kind(), ErrorKind::InvalidInput);
    }
}
