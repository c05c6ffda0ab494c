//! ビットマップで管理されるブロックプール型のアロケータ.
//!
//! 呼び出し元から渡されたバッファを、固定長のブロックの並びとして扱い、
//! 各ブロックの使用状況を一ビットで管理する.
//!
//! # バッファのレイアウト
//!
//! ```text
//! +----------------+------------------------------------------+
//! | bitmap         | region (block_size * block_count bytes)  |
//! +----------------+------------------------------------------+
//! ```
//!
//! 空きリストや結合処理用のデータ構造は持たない.
//! 隣接する空きブロックは、ビットマップ上で連続する`0`として表現されるので、
//! 複数ブロックにまたがる割当要求は、単に十分な長さの`0`の並びを探すだけで処理できる.
use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::ops::Range;

pub use self::builder::BlockPoolBuilder;

use self::bitmap::Bitmap;
use crate::alloc::{Alignment, Allocator, Span};
use crate::metrics::BlockPoolMetrics;
use crate::{ErrorKind, Result};

mod bitmap;
mod builder;

/// `block_size`バイトのブロックを`block_count`個管理するのに必要なバッファのサイズを返す.
///
/// # Examples
///
/// ```
/// use blockalloc::pool::required_buffer_size;
///
/// assert_eq!(required_buffer_size(16, 63), 1024);
/// assert_eq!(required_buffer_size(1, 1), 17);
/// ```
pub fn required_buffer_size(block_size: usize, block_count: usize) -> usize {
    BlockPool::bitmap_size(block_count) + block_size * block_count
}

/// プールの使用状況.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// 使用中のブロック数.
    pub used_blocks: usize,

    /// 空きブロック数.
    pub free_blocks: usize,

    /// ブロックサイズ.
    pub block_size: usize,
}
impl Usage {
    /// 使用中のバイト数を返す.
    ///
    /// ブロック単位で計算されるため、割当時に指定されたサイズの合計以上の値となる.
    pub fn used_bytes(&self) -> usize {
        self.used_blocks * self.block_size
    }

    /// 空きバイト数を返す.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks * self.block_size
    }

    /// ブロックの総数を返す.
    pub fn total_blocks(&self) -> usize {
        self.used_blocks + self.free_blocks
    }

    /// 割当可能な領域のバイト数を返す.
    pub fn total_bytes(&self) -> usize {
        self.total_blocks() * self.block_size
    }
}

/// ブロックプール型のアロケータ.
///
/// 割当は常にブロック単位に切り上げて行われるので、
/// 一回の割当での内部的な無駄は最大でも一ブロック未満となる.
/// 管理用のメモリ消費量は、割当パターンに関わらず、一ブロックにつき一ビットである.
///
/// # 割当戦略
///
/// "FirstFit"戦略を採用している.
///
/// 「空きがあるかもしれない最初のブロック」の位置をキャッシュしておき、そこから
/// 要求を満たす連続した空きブロックを探索する.
/// 最悪計算量は`O(block_count)`となる.
///
/// # 注意
///
/// 内部状態は`RefCell`で保持されているため、
/// `bytes()`や`bytes_mut()`が返した参照を保持したまま、割当や解放を行うとパニックする.
pub struct BlockPool {
    buffer: RefCell<Vec<u8>>,
    bitmap_size: usize,
    region_addr: usize,
    block_size: usize,
    block_count: usize,
    first_free: Cell<usize>,
    metrics: BlockPoolMetrics,
    logger: Logger,
}
impl BlockPool {
    /// `buffer`を`block_size`バイトのブロック`block_count`個として扱う、新しいプールを生成する.
    ///
    /// `buffer`の長さが`required_buffer_size()`を超えている場合には、余剰分は使われない.
    ///
    /// # Panics
    ///
    /// 以下の場合には、現在のスレッドがパニックする:
    ///
    /// - `block_size`が`0`
    /// - `block_count`が`0`
    /// - `buffer`の長さが`required_buffer_size(block_size, block_count)`未満
    ///
    /// パニックさせずにエラーとして扱いたい場合には[`BlockPoolBuilder`]を使用すること.
    ///
    /// [`BlockPoolBuilder`]: ./struct.BlockPoolBuilder.html
    pub fn new(buffer: Vec<u8>, block_size: usize, block_count: usize) -> Self {
        Self::with_options(
            buffer,
            block_size,
            block_count,
            &MetricBuilder::new(),
            Logger::root(Discard, o!()),
        )
    }

    pub(crate) fn with_options(
        mut buffer: Vec<u8>,
        block_size: usize,
        block_count: usize,
        metrics: &MetricBuilder,
        logger: Logger,
    ) -> Self {
        assert!(block_size >= 1, "block_size={}", block_size);
        assert!(block_count >= 1, "block_count={}", block_count);
        assert!(
            buffer.len() >= required_buffer_size(block_size, block_count),
            "buffer_size={}, required={}",
            buffer.len(),
            required_buffer_size(block_size, block_count)
        );

        let bitmap_size = Self::bitmap_size(block_count);
        Bitmap::init(&mut buffer[..bitmap_size], block_count);
        let region_addr = buffer.as_ptr() as usize + bitmap_size;
        BlockPool {
            buffer: RefCell::new(buffer),
            bitmap_size,
            region_addr,
            block_size,
            block_count,
            first_free: Cell::new(0),
            metrics: BlockPoolMetrics::new(metrics, block_count),
            logger,
        }
    }

    /// `block_count`個のブロックを管理するビットマップが、バッファの先頭で占めるバイト数を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use blockalloc::pool::BlockPool;
    ///
    /// assert_eq!(BlockPool::bitmap_size(63), 16);
    /// assert_eq!(BlockPool::bitmap_size(65), 24);
    /// ```
    pub fn bitmap_size(block_count: usize) -> usize {
        bitmap::encoded_size(block_count)
    }

    /// ブロックサイズを返す.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// ブロックの総数を返す.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// プールの使用状況を返す.
    pub fn usage(&self) -> Usage {
        let used_blocks = self.with_bitmap(|b| b.count_ones());
        Usage {
            used_blocks,
            free_blocks: self.block_count - used_blocks,
            block_size: self.block_size,
        }
    }

    /// 全ての割当を一括で解放する.
    ///
    /// これ以前に割り当てられた`Span`は、全て無効となる.
    pub fn free_all(&self) {
        let used_blocks = self.with_bitmap_mut(|b| {
            let n = b.count_ones();
            b.clear_all();
            n
        });
        self.first_free.set(0);
        self.metrics.released_blocks.add_u64(used_blocks as u64);
    }

    /// `addr`が割当可能な領域の内側を指しているかどうかを判定する.
    ///
    /// バッファの先頭にあるビットマップ部分は対象外.
    pub fn owns_ptr(&self, addr: usize) -> bool {
        self.region_addr <= addr && addr < self.region_end()
    }

    /// `span`全体が割当可能な領域の内側に収まっているかどうかを判定する.
    ///
    /// 長さが`0`の`Span`は、どの領域も含まないので、常に`false`となる.
    pub fn owns_span(&self, span: &Span) -> bool {
        !span.is_empty() && self.owns_ptr(span.addr()) && span.end() <= self.region_end()
    }

    /// `span`が指すバイト列への参照を返す.
    ///
    /// # Panics
    ///
    /// 空ではない`span`がこのプールの領域外を指している場合には、現在のスレッドがパニックする.
    pub fn bytes(&self, span: &Span) -> Ref<[u8]> {
        let range = self.byte_range(span);
        Ref::map(self.buffer.borrow(), |b| &b[range])
    }

    /// `span`が指すバイト列への可変参照を返す.
    ///
    /// # Panics
    ///
    /// 空ではない`span`がこのプールの領域外を指している場合には、現在のスレッドがパニックする.
    pub fn bytes_mut(&self, span: &Span) -> RefMut<[u8]> {
        let range = self.byte_range(span);
        RefMut::map(self.buffer.borrow_mut(), |b| &mut b[range])
    }

    /// プール用のメトリクスを返す.
    pub fn metrics(&self) -> &BlockPoolMetrics {
        &self.metrics
    }

    /// プールを破棄して、内部のバッファを返す.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer.into_inner()
    }

    fn region_end(&self) -> usize {
        self.region_addr + self.block_size * self.block_count
    }

    fn block_addr(&self, block: usize) -> usize {
        self.region_addr + block * self.block_size
    }

    fn block_index(&self, addr: usize) -> usize {
        (addr - self.region_addr) / self.block_size
    }

    // `padding + size`バイトを格納するのに必要なブロック数.
    // オーバーフローする場合には`None`を返す.
    fn blocks_for(&self, padding: usize, size: usize) -> Option<usize> {
        let bytes = padding.checked_add(size)?;
        Some(bytes / self.block_size + (bytes % self.block_size != 0) as usize)
    }

    fn byte_range(&self, span: &Span) -> Range<usize> {
        if span.is_empty() {
            return 0..0;
        }
        assert!(self.owns_span(span), "{:?}", span);
        let start = span.addr() - (self.region_addr - self.bitmap_size);
        start..start + span.len()
    }

    fn with_bitmap<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Bitmap<&[u8]>) -> T,
    {
        let buffer = self.buffer.borrow();
        f(&Bitmap::new(&buffer[..self.bitmap_size]))
    }

    fn with_bitmap_mut<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Bitmap<&mut [u8]>) -> T,
    {
        let mut buffer = self.buffer.borrow_mut();
        f(&mut Bitmap::new(&mut buffer[..self.bitmap_size]))
    }

    // 要求を満たす連続した空きブロックを探索する.
    //
    // 返り値は`(開始ブロック, ブロック内でのパディング, ブロック数)`.
    fn find_run(&self, size: usize, alignment: Alignment) -> Option<(usize, usize, usize)> {
        self.with_bitmap(|bitmap| {
            let mut block = self.first_free.get();
            while block < self.block_count {
                let padding = alignment.padding(self.block_addr(block));
                if padding >= self.block_size {
                    // 開始位置がこのブロックに収まらないので、次のブロックを試す
                    block += 1;
                    continue;
                }

                let blocks = self.blocks_for(padding, size)?;
                let end = block.checked_add(blocks)?;
                if end > self.block_count {
                    // これより後方の候補は、終端がさらに後ろになるので、探索を打ち切る
                    return None;
                }
                match bitmap.find_set(block, end) {
                    None => return Some((block, padding, blocks)),
                    Some(used) => block = used + 1,
                }
            }
            None
        })
    }

    fn mark_used(&self, start: usize, blocks: usize) {
        let first_free = self.first_free.get();
        self.with_bitmap_mut(|bitmap| {
            bitmap.set_range(start, blocks, true);
            if start <= first_free && first_free < start + blocks {
                let next = bitmap
                    .find_clear(start + blocks, self.block_count)
                    .unwrap_or(self.block_count);
                self.first_free.set(next);
            }
        });
    }

    fn mark_free(&self, start: usize, blocks: usize) {
        self.with_bitmap_mut(|bitmap| {
            debug_assert!(bitmap.get(start), "start={}", start);
            bitmap.set_range(start, blocks, false);
        });
        if start < self.first_free.get() {
            self.first_free.set(start);
        }
    }
}
impl Allocator for BlockPool {
    fn allocate(&self, size: usize, alignment: Alignment) -> Result<Span> {
        if size == 0 {
            return Ok(Span::empty(alignment));
        }
        if let Some((start, padding, blocks)) = self.find_run(size, alignment) {
            self.mark_used(start, blocks);
            self.metrics.count_allocation(blocks);
            Ok(Span::new(self.block_addr(start) + padding, size))
        } else {
            self.metrics.nospace_failures.increment();
            debug!(self.logger, "No run of free blocks is available";
                   "size" => size, "alignment" => alignment.as_usize());
            track_panic!(
                ErrorKind::OutOfMemory,
                "size={}, alignment={}",
                size,
                alignment.as_usize()
            );
        }
    }

    fn resize(&self, span: &mut Span, new_size: usize) -> bool {
        if new_size == span.len() {
            return true;
        }
        if span.is_empty() {
            // 長さ0のSpanはブロックを保持していないので、その場での拡張はできない
            return false;
        }
        assert!(self.owns_span(span), "{:?}", span);

        let first = self.block_index(span.addr());
        let padding = span.addr() - self.block_addr(first);
        let blocks = self.blocks_for(padding, span.len()).unwrap_or(0);
        let new_blocks = if new_size == 0 {
            0
        } else {
            match self.blocks_for(padding, new_size) {
                Some(n) => n,
                None => return false,
            }
        };

        if new_blocks < blocks {
            self.mark_free(first + new_blocks, blocks - new_blocks);
            self.metrics
                .shrunk_blocks
                .add_u64((blocks - new_blocks) as u64);
        } else if new_blocks > blocks {
            let end = first + blocks;
            let new_end = first.saturating_add(new_blocks);
            let available = new_end <= self.block_count
                && self.with_bitmap(|b| b.find_set(end, new_end)).is_none();
            if !available {
                self.metrics.resize_failures.increment();
                debug!(self.logger, "Trailing blocks are not free";
                       "span" => format!("{:?}", span), "new_size" => new_size);
                return false;
            }
            self.mark_used(end, new_end - end);
            self.metrics.grown_blocks.add_u64((new_end - end) as u64);
        }
        span.set_len(new_size);
        true
    }

    fn free(&self, span: Span) {
        if span.is_empty() {
            return;
        }
        assert!(self.owns_span(&span), "Not owned: {:?}", span);

        let first = self.block_index(span.addr());
        let last = self.block_index(span.end() - 1);
        let blocks = last - first + 1;
        assert!(
            self.with_bitmap(|b| b.find_clear(first, last + 1)).is_none(),
            "Double free: {:?}",
            span
        );
        self.mark_free(first, blocks);
        self.metrics.count_releasion(blocks);
    }
}
impl fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("region_addr", &self.region_addr)
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("first_free", &self.first_free.get())
            .finish()
    }
}
