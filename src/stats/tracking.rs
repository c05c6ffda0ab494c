use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use crate::{Error, ErrorKind, Result};

/// 統計用カウンタの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// `allocate`の呼び出し回数.
    Allocs,

    /// `resize`の呼び出し回数.
    Resizes,

    /// `free`の呼び出し回数.
    Frees,

    /// `allocate`の失敗回数.
    AllocFailures,

    /// `resize`の失敗回数.
    ResizeFailures,

    /// 割当に成功したバイト数の合計.
    BytesAllocated,

    /// 解放されたバイト数の合計.
    BytesFreed,

    /// リサイズ(拡張)で増加したバイト数の合計.
    BytesGrown,

    /// リサイズ(縮小)で減少したバイト数の合計.
    BytesShrunk,

    /// 割当に失敗した要求のバイト数の合計.
    BytesFailed,

    /// 使用中のバイト数の最大値.
    BytesHighWaterMark,
}
impl Counter {
    /// 全てのカウンタ.
    pub const ALL: [Counter; 11] = [
        Counter::Allocs,
        Counter::Resizes,
        Counter::Frees,
        Counter::AllocFailures,
        Counter::ResizeFailures,
        Counter::BytesAllocated,
        Counter::BytesFreed,
        Counter::BytesGrown,
        Counter::BytesShrunk,
        Counter::BytesFailed,
        Counter::BytesHighWaterMark,
    ];

    /// カウンタの名前を返す.
    pub fn name(self) -> &'static str {
        match self {
            Counter::Allocs => "allocs",
            Counter::Resizes => "resizes",
            Counter::Frees => "frees",
            Counter::AllocFailures => "alloc_failures",
            Counter::ResizeFailures => "resize_failures",
            Counter::BytesAllocated => "bytes_allocated",
            Counter::BytesFreed => "bytes_freed",
            Counter::BytesGrown => "bytes_grown",
            Counter::BytesShrunk => "bytes_shrunk",
            Counter::BytesFailed => "bytes_failed",
            Counter::BytesHighWaterMark => "bytes_high_water_mark",
        }
    }

    #[doc(hidden)]
    pub const fn is_in(self, counters: &[Counter]) -> bool {
        let mut i = 0;
        while i < counters.len() {
            if counters[i] as u8 == self as u8 {
                return true;
            }
            i += 1;
        }
        false
    }
}
impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for Counter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(c) = Counter::ALL.iter().find(|c| c.name() == s) {
            Ok(*c)
        } else {
            track_panic!(ErrorKind::InvalidInput, "Unknown counter: {:?}", s);
        }
    }
}

/// 一つのカウンタの格納領域.
///
/// 追跡対象外のカウンタには[`Untracked`]が使われ、
/// 格納領域を一切持たず、更新処理も全て何もしない.
///
/// [`Untracked`]: ./struct.Untracked.html
pub trait Slot: Default {
    /// 追跡対象かどうか.
    const ENABLED: bool;

    /// 現在値を返す.
    fn get(&self) -> u64;

    /// 値を`n`だけ増やす.
    fn add(&self, n: u64);

    /// 値を`1`だけ増やす.
    fn increment(&self) {
        self.add(1);
    }

    /// 値を`value`と現在値の大きい方に更新する.
    fn raise_to(&self, value: u64);
}

/// 追跡対象のカウンタ.
#[derive(Debug, Default)]
pub struct Tracked(Cell<u64>);
impl Slot for Tracked {
    const ENABLED: bool = true;

    #[inline]
    fn get(&self) -> u64 {
        self.0.get()
    }

    #[inline]
    fn add(&self, n: u64) {
        self.0.set(self.0.get() + n);
    }

    #[inline]
    fn raise_to(&self, value: u64) {
        if value > self.0.get() {
            self.0.set(value);
        }
    }
}

/// 追跡対象外のカウンタ.
#[derive(Debug, Default, Clone, Copy)]
pub struct Untracked;
impl Slot for Untracked {
    const ENABLED: bool = false;

    #[inline(always)]
    fn get(&self) -> u64 {
        0
    }

    #[inline(always)]
    fn add(&self, _n: u64) {}

    #[inline(always)]
    fn raise_to(&self, _value: u64) {}
}

/// 真偽値から`Slot`型を選択するための型.
#[doc(hidden)]
#[derive(Debug)]
pub struct Select<const TRACKED: bool>;

#[doc(hidden)]
pub trait SlotFor {
    type Slot: Slot;
}
impl SlotFor for Select<true> {
    type Slot = Tracked;
}
impl SlotFor for Select<false> {
    type Slot = Untracked;
}

/// どのカウンタを追跡するかを表す設定.
///
/// 各カウンタに対応する関連型が[`Tracked`]なら追跡対象、[`Untracked`]なら対象外となる.
/// 設定ごとに別の型となるので、対象外のカウンタの格納領域や更新処理は、コンパイル時に取り除かれる.
///
/// 通常は[`tracking!`]マクロを使って定義する.
///
/// [`Tracked`]: ./struct.Tracked.html
/// [`Untracked`]: ./struct.Untracked.html
/// [`tracking!`]: ../macro.tracking.html
pub trait Tracking {
    #[allow(missing_docs)]
    type Allocs: Slot;
    #[allow(missing_docs)]
    type Resizes: Slot;
    #[allow(missing_docs)]
    type Frees: Slot;
    #[allow(missing_docs)]
    type AllocFailures: Slot;
    #[allow(missing_docs)]
    type ResizeFailures: Slot;
    #[allow(missing_docs)]
    type BytesAllocated: Slot;
    #[allow(missing_docs)]
    type BytesFreed: Slot;
    #[allow(missing_docs)]
    type BytesGrown: Slot;
    #[allow(missing_docs)]
    type BytesShrunk: Slot;
    #[allow(missing_docs)]
    type BytesFailed: Slot;
    #[allow(missing_docs)]
    type BytesHighWaterMark: Slot;

    /// 追跡対象のカウンタが一つも無いかどうか.
    const IS_EMPTY: bool = !(<Self::Allocs as Slot>::ENABLED
        || <Self::Resizes as Slot>::ENABLED
        || <Self::Frees as Slot>::ENABLED
        || <Self::AllocFailures as Slot>::ENABLED
        || <Self::ResizeFailures as Slot>::ENABLED
        || <Self::BytesAllocated as Slot>::ENABLED
        || <Self::BytesFreed as Slot>::ENABLED
        || <Self::BytesGrown as Slot>::ENABLED
        || <Self::BytesShrunk as Slot>::ENABLED
        || <Self::BytesFailed as Slot>::ENABLED
        || <Self::BytesHighWaterMark as Slot>::ENABLED);

    /// 使用中のバイト数の計算に必要な四つのカウンタが、全て追跡対象かどうか.
    const TRACKS_BYTES_IN_USE: bool = <Self::BytesAllocated as Slot>::ENABLED
        && <Self::BytesFreed as Slot>::ENABLED
        && <Self::BytesGrown as Slot>::ENABLED
        && <Self::BytesShrunk as Slot>::ENABLED;

    /// 最大使用量が更新されるかどうか.
    const TRACKS_HIGH_WATER_MARK: bool =
        Self::TRACKS_BYTES_IN_USE && <Self::BytesHighWaterMark as Slot>::ENABLED;
}

/// 追跡するカウンタを列挙して、[`Tracking`]を実装した型を定義する.
///
/// [`Tracking`]: ./stats/trait.Tracking.html
///
/// # Examples
///
/// ```
/// #[macro_use]
/// extern crate blockalloc;
///
/// use blockalloc::stats::Tracking;
///
/// tracking! {
///     /// 呼び出し回数のみを追跡する.
///     pub struct CallsOnly { Allocs, Resizes, Frees }
/// }
///
/// # fn main() {
/// assert!(!CallsOnly::IS_EMPTY);
/// assert!(!CallsOnly::TRACKS_BYTES_IN_USE);
/// # }
/// ```
#[macro_export]
macro_rules! tracking {
    ($(#[$attr:meta])* $vis:vis struct $name:ident { $($counter:ident),* $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;
        impl $crate::stats::Tracking for $name {
            type Allocs = $crate::tracking!(@slot Allocs; $($counter),*);
            type Resizes = $crate::tracking!(@slot Resizes; $($counter),*);
            type Frees = $crate::tracking!(@slot Frees; $($counter),*);
            type AllocFailures = $crate::tracking!(@slot AllocFailures; $($counter),*);
            type ResizeFailures = $crate::tracking!(@slot ResizeFailures; $($counter),*);
            type BytesAllocated = $crate::tracking!(@slot BytesAllocated; $($counter),*);
            type BytesFreed = $crate::tracking!(@slot BytesFreed; $($counter),*);
            type BytesGrown = $crate::tracking!(@slot BytesGrown; $($counter),*);
            type BytesShrunk = $crate::tracking!(@slot BytesShrunk; $($counter),*);
            type BytesFailed = $crate::tracking!(@slot BytesFailed; $($counter),*);
            type BytesHighWaterMark = $crate::tracking!(@slot BytesHighWaterMark; $($counter),*);
        }
    };
    (@slot $target:ident; $($counter:ident),*) => {
        <$crate::stats::Select<{
            $crate::stats::Counter::$target.is_in(&[$($crate::stats::Counter::$counter),*])
        }> as $crate::stats::SlotFor>::Slot
    };
}

tracking! {
    /// 全てのカウンタを追跡する.
    pub struct TrackAll {
        Allocs,
        Resizes,
        Frees,
        AllocFailures,
        ResizeFailures,
        BytesAllocated,
        BytesFreed,
        BytesGrown,
        BytesShrunk,
        BytesFailed,
        BytesHighWaterMark,
    }
}

tracking! {
    /// どのカウンタも追跡しない.
    pub struct TrackNone {}
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    tracking! {
        struct BytesOnly { BytesAllocated, BytesFreed, BytesGrown, BytesShrunk }
    }

    #[test]
    fn counter_names() {
        for c in Counter::ALL.iter() {
            assert_eq!(c.name().parse::<Counter>().ok(), Some(*c));
            assert_eq!(c.to_string(), c.name());
        }
        assert_eq!(
            "foo".parse::<Counter>().err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
    }

    #[test]
    fn slots_work() {
        let t = Tracked::default();
        t.increment();
        t.add(10);
        assert_eq!(t.get(), 11);
        t.raise_to(5);
        assert_eq!(t.get(), 11);
        t.raise_to(20);
        assert_eq!(t.get(), 20);

        let u = Untracked;
        u.add(10);
        u.raise_to(20);
        assert_eq!(u.get(), 0);
        assert_eq!(mem::size_of::<Untracked>(), 0);
    }

    #[test]
    fn tracking_flags() {
        assert!(!TrackAll::IS_EMPTY);
        assert!(TrackAll::TRACKS_BYTES_IN_USE);
        assert!(TrackAll::TRACKS_HIGH_WATER_MARK);

        assert!(TrackNone::IS_EMPTY);
        assert!(!TrackNone::TRACKS_BYTES_IN_USE);

        assert!(!BytesOnly::IS_EMPTY);
        assert!(BytesOnly::TRACKS_BYTES_IN_USE);
        assert!(!BytesOnly::TRACKS_HIGH_WATER_MARK);
        assert!(!<<BytesOnly as Tracking>::Allocs as Slot>::ENABLED);
        assert!(<<BytesOnly as Tracking>::BytesGrown as Slot>::ENABLED);
    }
}
