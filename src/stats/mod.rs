//! 呼び出しを転送しつつ統計情報を収集するアロケータ.
//!
//! どのカウンタを追跡するかは型パラメータ([`Tracking`])で指定する.
//! 追跡対象外のカウンタは格納領域を持たず、その更新処理もコンパイル時に取り除かれる.
//!
//! [`Tracking`]: ./trait.Tracking.html
use std::fmt;

pub use self::tracking::{Counter, Slot, TrackAll, TrackNone, Tracked, Tracking, Untracked};
#[doc(hidden)]
pub use self::tracking::{Select, SlotFor};

use crate::alloc::{Alignment, Allocator, Span};
use crate::Result;

#[macro_use]
mod tracking;

/// 統計情報を収集するアロケータ.
///
/// 全ての呼び出しは、そのまま`backing`に転送される.
/// `backing`の所有権は持たない.
///
/// # Examples
///
/// ```
/// use blockalloc::alloc::{Alignment, Allocator};
/// use blockalloc::pool::BlockPool;
/// use blockalloc::stats::{Counter, StatsAllocator, TrackAll};
///
/// let pool = BlockPool::new(vec![0; 1024], 16, 63);
/// let stats = StatsAllocator::<_, TrackAll>::new(&pool);
///
/// let span = stats.allocate(10, Alignment::default()).unwrap();
/// assert_eq!(stats.bytes_in_use(), 10);
/// stats.free(span);
/// assert_eq!(stats.get(Counter::Allocs), 1);
/// assert_eq!(stats.bytes_in_use(), 0);
/// ```
pub struct StatsAllocator<'a, A: 'a, C: Tracking = TrackAll> {
    backing: &'a A,
    allocs: C::Allocs,
    resizes: C::Resizes,
    frees: C::Frees,
    alloc_failures: C::AllocFailures,
    resize_failures: C::ResizeFailures,
    bytes_allocated: C::BytesAllocated,
    bytes_freed: C::BytesFreed,
    bytes_grown: C::BytesGrown,
    bytes_shrunk: C::BytesShrunk,
    bytes_failed: C::BytesFailed,
    bytes_high_water_mark: C::BytesHighWaterMark,
}
impl<'a, A: Allocator + 'a, C: Tracking> StatsAllocator<'a, A, C> {
    /// `backing`への呼び出しを観測する、新しいインスタンスを生成する.
    pub fn new(backing: &'a A) -> Self {
        StatsAllocator {
            backing,
            allocs: Default::default(),
            resizes: Default::default(),
            frees: Default::default(),
            alloc_failures: Default::default(),
            resize_failures: Default::default(),
            bytes_allocated: Default::default(),
            bytes_freed: Default::default(),
            bytes_grown: Default::default(),
            bytes_shrunk: Default::default(),
            bytes_failed: Default::default(),
            bytes_high_water_mark: Default::default(),
        }
    }

    /// 利用者向けのアロケータハンドルを返す.
    ///
    /// 追跡対象のカウンタが一つも無い場合には、このインスタンスを経由せずに、
    /// `backing`そのものが返される.
    pub fn allocator(&self) -> &dyn Allocator {
        if C::IS_EMPTY {
            self.backing
        } else {
            self
        }
    }

    /// 転送先のアロケータを返す.
    pub fn backing(&self) -> &'a A {
        self.backing
    }

    /// カウンタの現在値を返す.
    ///
    /// 追跡対象外のカウンタの場合には`0`が返される.
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Allocs => self.allocs.get(),
            Counter::Resizes => self.resizes.get(),
            Counter::Frees => self.frees.get(),
            Counter::AllocFailures => self.alloc_failures.get(),
            Counter::ResizeFailures => self.resize_failures.get(),
            Counter::BytesAllocated => self.bytes_allocated.get(),
            Counter::BytesFreed => self.bytes_freed.get(),
            Counter::BytesGrown => self.bytes_grown.get(),
            Counter::BytesShrunk => self.bytes_shrunk.get(),
            Counter::BytesFailed => self.bytes_failed.get(),
            Counter::BytesHighWaterMark => self.bytes_high_water_mark.get(),
        }
    }

    /// `counter`が追跡対象かどうかを判定する.
    pub fn is_tracked(&self, counter: Counter) -> bool {
        match counter {
            Counter::Allocs => <C::Allocs as Slot>::ENABLED,
            Counter::Resizes => <C::Resizes as Slot>::ENABLED,
            Counter::Frees => <C::Frees as Slot>::ENABLED,
            Counter::AllocFailures => <C::AllocFailures as Slot>::ENABLED,
            Counter::ResizeFailures => <C::ResizeFailures as Slot>::ENABLED,
            Counter::BytesAllocated => <C::BytesAllocated as Slot>::ENABLED,
            Counter::BytesFreed => <C::BytesFreed as Slot>::ENABLED,
            Counter::BytesGrown => <C::BytesGrown as Slot>::ENABLED,
            Counter::BytesShrunk => <C::BytesShrunk as Slot>::ENABLED,
            Counter::BytesFailed => <C::BytesFailed as Slot>::ENABLED,
            Counter::BytesHighWaterMark => <C::BytesHighWaterMark as Slot>::ENABLED,
        }
    }

    /// 追跡対象の全カウンタの現在値を返す.
    pub fn snapshot(&self) -> Vec<(Counter, u64)> {
        Counter::ALL
            .iter()
            .filter(|&&c| self.is_tracked(c))
            .map(|&c| (c, self.get(c)))
            .collect()
    }

    /// 使用中のバイト数を返す.
    ///
    /// `BytesAllocated`、`BytesGrown`、`BytesShrunk`、`BytesFreed`の
    /// 全てが追跡対象ではない場合には、常に`0`が返される.
    pub fn bytes_in_use(&self) -> u64 {
        if !C::TRACKS_BYTES_IN_USE {
            return 0;
        }
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.bytes_shrunk.get() + self.bytes_freed.get();
        let inc = self.bytes_allocated.get() + self.bytes_grown.get();
        inc - dec
    }

    fn update_high_water_mark(&self) {
        if C::TRACKS_HIGH_WATER_MARK {
            self.bytes_high_water_mark.raise_to(self.bytes_in_use());
        }
    }
}
impl<'a, A: Allocator + 'a, C: Tracking> Allocator for StatsAllocator<'a, A, C> {
    fn allocate(&self, size: usize, alignment: Alignment) -> Result<Span> {
        self.allocs.increment();
        match self.backing.allocate(size, alignment) {
            Ok(span) => {
                self.bytes_allocated.add(size as u64);
                self.update_high_water_mark();
                Ok(span)
            }
            Err(e) => {
                self.alloc_failures.increment();
                self.bytes_failed.add(size as u64);
                Err(track!(e))
            }
        }
    }

    fn resize(&self, span: &mut Span, new_size: usize) -> bool {
        self.resizes.increment();
        let old_size = span.len();
        if !self.backing.resize(span, new_size) {
            self.resize_failures.increment();
            return false;
        }
        if new_size > old_size {
            self.bytes_grown.add((new_size - old_size) as u64);
            self.update_high_water_mark();
        } else {
            self.bytes_shrunk.add((old_size - new_size) as u64);
        }
        true
    }

    fn free(&self, span: Span) {
        self.frees.increment();
        let size = span.len();
        self.backing.free(span);
        self.bytes_freed.add(size as u64);
    }
}
impl<'a, A: Allocator + 'a, C: Tracking> fmt::Debug for StatsAllocator<'a, A, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct("StatsAllocator");
        for (counter, value) in self.snapshot() {
            s.field(counter.name(), &value);
        }
        s.finish()
    }
}
