/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 要求を満たすだけの空き領域が存在しない.
    ///
    /// アロケータの利用においては通常起こり得る結果であり、異常ではない.
    ///
    /// # 典型的な対応策
    ///
    /// - 不要な領域を解放した上でリトライする
    /// - 別のアロケータで新規に割り当てて、内容をコピーする
    OutOfMemory,

    /// 入力が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,
}
impl trackable::error::ErrorKind for ErrorKind {}
