//! 要求サイズに応じて、割当を複数のアロケータに振り分けるアロケータ.
//!
//! 各アロケータは、サイズ範囲と組にされた[`Bucket`]として登録され、
//! 要求は、その範囲にサイズが含まれる最初のバケツに転送される.
//!
//! [`Bucket`]: ./struct.Bucket.html
use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::fmt;

use crate::alloc::{Alignment, Allocator, Span};
use crate::metrics::CompositeMetrics;
use crate::{ErrorKind, Result};

/// サイズ範囲`[min, max)`と、その範囲の要求を担当するアロケータの組.
#[derive(Clone, Copy)]
pub struct Bucket<'a> {
    /// 範囲の下限(含む).
    pub min: usize,

    /// 範囲の上限(含まない).
    pub max: usize,

    /// 範囲内の要求を処理するアロケータ.
    pub delegate: &'a dyn Allocator,
}
impl<'a> Bucket<'a> {
    /// 新しい`Bucket`インスタンスを生成する.
    pub fn new(min: usize, max: usize, delegate: &'a dyn Allocator) -> Self {
        Bucket { min, max, delegate }
    }

    /// `min`以上の全てのサイズを担当する`Bucket`インスタンスを生成する.
    ///
    /// 上限には`usize::MAX`が使われる.
    /// バケツ列の末尾に置くことで、取りこぼしを防ぐことができる.
    pub fn unbounded(min: usize, delegate: &'a dyn Allocator) -> Self {
        Bucket {
            min,
            max: usize::max_value(),
            delegate,
        }
    }

    /// `size`がこのバケツの範囲に含まれるかどうかを判定する.
    pub fn contains(&self, size: usize) -> bool {
        self.min <= size && size < self.max
    }
}
impl<'a> fmt::Debug for Bucket<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("delegate", &(self.delegate as *const _ as *const ()))
            .finish()
    }
}

/// サイズによる振り分けを行うアロケータ.
///
/// バケツの範囲同士は重なっていても良く、その場合には先に登録されている方が優先される.
///
/// バケツ列および各アロケータの所有権は持たないので、
/// 呼び出し元は、それらをこのインスタンスより長く生存させる必要がある.
///
/// # 注意
///
/// 各アロケータは自分が割り当てた領域しか知らないので、
/// 解放時やリサイズ時の転送先は、`Span`の現在の長さから決定される.
/// そのため、リサイズによって別のバケツの範囲に移るような要求は常に失敗する.
/// 境界を跨ぎたい場合には、呼び出し元が新規割当・コピー・解放を行う必要がある.
///
/// 長さ`0`の要求はバケツを参照せずに処理される.
/// 割当は常に成功し、解放は何もしない.
/// ただし長さ`0`への縮小だけは、現在のバケツに転送される.
#[derive(Debug)]
pub struct CompositeAllocator<'a> {
    buckets: &'a [Bucket<'a>],
    metrics: CompositeMetrics,
    logger: Logger,
}
impl<'a> CompositeAllocator<'a> {
    /// `buckets`を使って振り分けを行う、新しいインスタンスを生成する.
    pub fn new(buckets: &'a [Bucket<'a>]) -> Self {
        CompositeBuilder::new().finish(buckets)
    }

    /// 登録されているバケツ列を返す.
    pub fn buckets(&self) -> &'a [Bucket<'a>] {
        self.buckets
    }

    /// `size`を範囲に含む最初のバケツを返す.
    pub fn bucket_for(&self, size: usize) -> Option<&'a Bucket<'a>> {
        self.position_for(size).map(|i| &self.buckets[i])
    }

    /// アロケータ用のメトリクスを返す.
    pub fn metrics(&self) -> &CompositeMetrics {
        &self.metrics
    }

    fn position_for(&self, size: usize) -> Option<usize> {
        self.buckets.iter().position(|b| b.contains(size))
    }
}
impl<'a> Allocator for CompositeAllocator<'a> {
    fn allocate(&self, size: usize, alignment: Alignment) -> Result<Span> {
        if size == 0 {
            return Ok(Span::empty(alignment));
        }
        if let Some(bucket) = self.bucket_for(size) {
            self.metrics.routed_allocations.increment();
            track!(bucket.delegate.allocate(size, alignment))
        } else {
            self.metrics.unroutable_allocations.increment();
            debug!(self.logger, "No bucket matches the requested size"; "size" => size);
            track_panic!(ErrorKind::OutOfMemory, "No bucket: size={}", size);
        }
    }

    fn resize(&self, span: &mut Span, new_size: usize) -> bool {
        if new_size == span.len() {
            return true;
        }
        if span.is_empty() {
            return false;
        }
        let current = self
            .position_for(span.len())
            .unwrap_or_else(|| panic!("No bucket owns the span: {:?}", span));
        if new_size != 0 && self.position_for(new_size) != Some(current) {
            self.metrics.crossing_resizes.increment();
            debug!(self.logger, "Resizing across bucket boundary is rejected";
                   "size" => span.len(), "new_size" => new_size);
            return false;
        }
        self.buckets[current].delegate.resize(span, new_size)
    }

    fn free(&self, span: Span) {
        if span.is_empty() {
            return;
        }
        let bucket = self
            .bucket_for(span.len())
            .unwrap_or_else(|| panic!("No bucket owns the span: {:?}", span));
        bucket.delegate.free(span);
    }
}

/// `CompositeAllocator`のビルダ.
#[derive(Debug, Clone)]
pub struct CompositeBuilder {
    metrics: MetricBuilder,
    logger: Logger,
}
impl CompositeBuilder {
    /// デフォルト設定で`CompositeBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        CompositeBuilder {
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// 振り分け処理用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// `buckets`を使って振り分けを行う`CompositeAllocator`を生成する.
    pub fn finish<'a>(&self, buckets: &'a [Bucket<'a>]) -> CompositeAllocator<'a> {
        CompositeAllocator {
            buckets,
            metrics: CompositeMetrics::new(&self.metrics),
            logger: self.logger.clone(),
        }
    }
}
impl Default for CompositeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::pool::{required_buffer_size, BlockPool};
    use crate::ErrorKind;

    fn pool(block_size: usize, block_count: usize) -> BlockPool {
        let buffer = vec![0; required_buffer_size(block_size, block_count)];
        BlockPool::new(buffer, block_size, block_count)
    }

    fn same(a: &dyn Allocator, b: &dyn Allocator) -> bool {
        a as *const _ as *const () == b as *const _ as *const ()
    }

    #[test]
    fn it_works() -> TestResult {
        let a = pool(16, 8);
        let b = pool(128, 8);
        let c = pool(1024, 4);
        let buckets = [
            Bucket::new(0, 16, &a),
            Bucket::new(16, 128, &b),
            Bucket::unbounded(128, &c),
        ];
        let composite = CompositeAllocator::new(&buckets);

        let x = track!(composite.allocate(10, Alignment::default()))?;
        let y = track!(composite.allocate(50, Alignment::default()))?;
        let z = track!(composite.allocate(1000, Alignment::default()))?;
        assert!(a.owns_span(&x));
        assert!(b.owns_span(&y));
        assert!(c.owns_span(&z));
        assert_eq!(a.usage().used_blocks, 1);
        assert_eq!(b.usage().used_blocks, 1);
        assert_eq!(c.usage().used_blocks, 1);
        assert_eq!(composite.metrics().routed_allocations(), 3);

        composite.free(x);
        assert_eq!(a.usage().used_blocks, 0);
        composite.free(y);
        assert_eq!(b.usage().used_blocks, 0);
        composite.free(z);
        assert_eq!(c.usage().used_blocks, 0);
        Ok(())
    }

    #[test]
    fn first_match_wins() {
        let a = pool(8, 1);
        let b = pool(8, 1);
        let buckets = [
            Bucket::new(0, 100, &a),
            Bucket::new(50, 200, &b),
            Bucket::unbounded(0, &b),
        ];
        let composite = CompositeAllocator::new(&buckets);
        assert!(same(composite.bucket_for(0).unwrap().delegate, &a));
        assert!(same(composite.bucket_for(75).unwrap().delegate, &a));
        assert!(same(composite.bucket_for(100).unwrap().delegate, &b));
        assert_eq!(composite.bucket_for(100).unwrap().min, 50);
        assert_eq!(composite.bucket_for(200).unwrap().min, 0);
        assert_eq!(composite.buckets().len(), 3);
    }

    #[test]
    fn no_matching_bucket() {
        let a = pool(8, 4);
        let buckets = [Bucket::new(1, 16, &a)];
        let composite = CompositeAllocator::new(&buckets);
        assert!(composite.bucket_for(0).is_none());
        assert!(composite.bucket_for(16).is_none());
        assert_eq!(
            composite
                .allocate(16, Alignment::default())
                .err()
                .map(|e| *e.kind()),
            Some(ErrorKind::OutOfMemory)
        );
        assert_eq!(composite.metrics().unroutable_allocations(), 1);
    }

    #[test]
    fn resize_within_bucket() -> TestResult {
        let a = pool(8, 8);
        let b = pool(64, 8);
        let buckets = [Bucket::new(0, 32, &a), Bucket::unbounded(32, &b)];
        let composite = CompositeAllocator::new(&buckets);

        let mut x = track!(composite.allocate(4, Alignment::default()))?;
        assert!(composite.resize(&mut x, 4));
        assert!(composite.resize(&mut x, 20));
        assert_eq!(a.usage().used_blocks, 3);
        assert!(composite.resize(&mut x, 2));
        assert_eq!(a.usage().used_blocks, 1);

        // 別のバケツの範囲への拡張は拒否される
        assert!(!composite.resize(&mut x, 40));
        assert_eq!(x.len(), 2);
        assert_eq!(a.usage().used_blocks, 1);
        assert_eq!(b.usage().used_blocks, 0);
        assert_eq!(composite.metrics().crossing_resizes(), 1);

        composite.free(x);
        assert_eq!(a.usage().used_blocks, 0);
        Ok(())
    }

    #[test]
    fn resize_fails_when_delegate_cannot_grow() -> TestResult {
        let a = pool(8, 2);
        let buckets = [Bucket::unbounded(0, &a)];
        let composite = CompositeAllocator::new(&buckets);

        let mut x = track!(composite.allocate(8, Alignment::default()))?;
        let y = track!(composite.allocate(8, Alignment::default()))?;
        assert!(!composite.resize(&mut x, 9));
        assert_eq!(x.len(), 8);
        composite.free(x);
        composite.free(y);
        Ok(())
    }

    #[test]
    #[should_panic]
    fn free_without_bucket() {
        let a = pool(8, 4);
        let buckets = [Bucket::new(0, 16, &a)];
        let composite = CompositeAllocator::new(&buckets);
        composite.free(Span::new(0, 32));
    }

    #[test]
    #[should_panic]
    fn resize_without_bucket() {
        let a = pool(8, 4);
        let buckets = [Bucket::new(0, 16, &a)];
        let composite = CompositeAllocator::new(&buckets);
        let mut span = Span::new(0, 32);
        composite.resize(&mut span, 8);
    }

    #[test]
    fn zero_size_requests_skip_buckets() -> TestResult {
        let a = pool(8, 4);
        let buckets = [Bucket::new(16, 128, &a), Bucket::unbounded(128, &a)];
        let composite = CompositeAllocator::new(&buckets);
        assert!(composite.bucket_for(0).is_none());

        let mut empty = track!(composite.allocate(0, Alignment::new(8)?))?;
        assert!(empty.is_empty());
        assert_eq!(empty.addr(), 8);
        assert_eq!(composite.metrics().routed_allocations(), 0);
        assert_eq!(composite.metrics().unroutable_allocations(), 0);

        assert!(composite.resize(&mut empty, 0));
        assert!(!composite.resize(&mut empty, 20));
        assert!(empty.is_empty());
        composite.free(empty);
        assert_eq!(a.usage().used_blocks, 0);

        // 長さ0への縮小は、現在のバケツのアロケータが処理する
        let mut x = track!(composite.allocate(20, Alignment::default()))?;
        assert_eq!(a.usage().used_blocks, 3);
        assert!(composite.resize(&mut x, 0));
        assert!(x.is_empty());
        assert_eq!(a.usage().used_blocks, 0);
        composite.free(x);
        Ok(())
    }
}
