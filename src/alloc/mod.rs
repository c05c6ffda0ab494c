//! 全てのアロケータが共有する能力(capability)の定義.
//!
//! アロケータは[`Allocator`]トレイトを実装し、バイト列の部分領域([`Span`])の
//! 割当・リサイズ・解放の三操作を提供する.
//!
//! [`Allocator`]: ./trait.Allocator.html
//! [`Span`]: ./struct.Span.html
use crate::{ErrorKind, Result};

/// アライメントを表現するための構造体.
///
/// 値は常に2の冪であることが保証されている.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(usize);
impl Alignment {
    /// 許容されるアライメントの最小値.
    ///
    /// また`Alignment::default()`で使われる値でもある.
    pub const MIN: usize = 1;

    /// 指定された値のアライメントを表現する`Alignment`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `alignment`が2の冪ではない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockalloc::ErrorKind;
    /// use blockalloc::alloc::Alignment;
    ///
    /// assert_eq!(Alignment::new(1).ok().map(|a| a.as_usize()), Some(1));
    /// assert_eq!(Alignment::new(64).ok().map(|a| a.as_usize()), Some(64));
    ///
    /// assert_eq!(Alignment::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(Alignment::new(24).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(alignment: usize) -> Result<Self> {
        track_assert!(alignment.is_power_of_two(), ErrorKind::InvalidInput; alignment);
        Ok(Alignment(alignment))
    }

    /// 型`T`のアライメントを返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockalloc::alloc::Alignment;
    ///
    /// assert_eq!(Alignment::of::<u64>().as_usize(), std::mem::align_of::<u64>());
    /// ```
    pub fn of<T>() -> Self {
        Alignment(std::mem::align_of::<T>())
    }

    /// アライメント値を`usize`に変換して返す.
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// 指定アドレス以降で、最初にアライメント境界に沿っている位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockalloc::alloc::Alignment;
    ///
    /// let alignment = Alignment::new(8).unwrap();
    /// assert_eq!(alignment.ceil_align(0), 0);
    /// assert_eq!(alignment.ceil_align(1), 8);
    /// assert_eq!(alignment.ceil_align(8), 8);
    /// ```
    pub fn ceil_align(self, addr: usize) -> usize {
        (addr + self.0 - 1) & !(self.0 - 1)
    }

    /// `addr`をアライメント境界に揃えるために必要なパディングのバイト数を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockalloc::alloc::Alignment;
    ///
    /// let alignment = Alignment::new(16).unwrap();
    /// assert_eq!(alignment.padding(32), 0);
    /// assert_eq!(alignment.padding(33), 15);
    /// ```
    pub fn padding(self, addr: usize) -> usize {
        self.ceil_align(addr) - addr
    }

    /// 指定アドレスがアライメント境界に沿っているかどうかを判定する.
    pub fn is_aligned(self, addr: usize) -> bool {
        addr & (self.0 - 1) == 0
    }
}
impl Default for Alignment {
    fn default() -> Self {
        Alignment(Self::MIN)
    }
}

/// アロケータが割り当てたメモリ上の部分領域.
///
/// `Span`自体は所有権を持たない単なる"ビュー"であり、
/// 実際のメモリは、それを割り当てたアロケータが所有し続ける.
///
/// `Clone`も`Copy`も実装されていないため、利用者が保持するハンドルは常に一つであり、
/// `Allocator::free`に値渡しすることで、ちょうど一度だけ返却される.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Span {
    addr: usize,
    len: usize,
}
impl Span {
    /// 開始アドレスと長さを指定して`Span`を生成する.
    ///
    /// `Allocator`の実装者向けのコンストラクタ.
    /// ここで生成された`Span`が有効かどうかは、それを受け取るアロケータの状態次第である.
    pub fn new(addr: usize, len: usize) -> Self {
        Span { addr, len }
    }

    /// 長さが`0`の`Span`を生成する.
    ///
    /// 開始アドレスには`alignment`の値が使われるので、常にアライメント済みとなる.
    /// 長さが`0`の`Span`はメモリを一切保持していない.
    pub fn empty(alignment: Alignment) -> Self {
        Span {
            addr: alignment.as_usize(),
            len: 0,
        }
    }

    /// 開始アドレスを返す.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// 長さ(バイト単位)を返す.
    pub fn len(&self) -> usize {
        self.len
    }

    /// 長さが`0`かどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 終端アドレスを返す.
    ///
    /// **注意**: `Span`は [addr, end) の領域を表すので、end自体は含まれない.
    pub fn end(&self) -> usize {
        self.addr + self.len
    }

    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len;
    }
}

/// アロケータが提供する能力.
///
/// 全てのメソッドは`&self`を受け取るので、実装側は内部可変性を用いて状態を更新する.
/// 各実装はシングルスレッドでの利用を前提としており、内部で排他制御は行わない.
pub trait Allocator {
    /// `size`バイトの部分領域を、`alignment`境界に揃えて割り当てる.
    ///
    /// `size`が`0`の場合には、常に長さ`0`の`Span`が返される.
    ///
    /// # Errors
    ///
    /// 要求を満たす領域が存在しない場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される.
    fn allocate(&self, size: usize, alignment: Alignment) -> Result<Span>;

    /// 割当済みの部分領域の長さを、その場で(再配置せずに)`new_size`に変更する.
    ///
    /// 成功した場合には`span`の長さが更新され`true`が返される.
    /// 失敗した場合には`span`は変更されず`false`が返される.
    ///
    /// 現在の長さと`new_size`が等しい場合には、常に成功する.
    fn resize(&self, span: &mut Span, new_size: usize) -> bool;

    /// 割当済みの部分領域を解放する.
    ///
    /// # Panics
    ///
    /// `span`がこのアロケータによって割り当てられたものではない場合や、
    /// 既に解放済みであることが検出された場合には、現在のスレッドがパニックする.
    fn free(&self, span: Span);
}
impl<'a, T: Allocator + ?Sized> Allocator for &'a T {
    fn allocate(&self, size: usize, alignment: Alignment) -> Result<Span> {
        (**self).allocate(size, alignment)
    }
    fn resize(&self, span: &mut Span, new_size: usize) -> bool {
        (**self).resize(span, new_size)
    }
    fn free(&self, span: Span) {
        (**self).free(span)
    }
}
