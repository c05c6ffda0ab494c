//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// [`BlockPool`]のメトリクス.
///
/// [`BlockPool`]: ../pool/struct.BlockPool.html
#[derive(Debug, Clone)]
pub struct BlockPoolMetrics {
    pub(crate) capacity_blocks: Gauge,
    pub(crate) allocated_spans: Counter,
    pub(crate) allocated_blocks: Counter,
    pub(crate) released_spans: Counter,
    pub(crate) released_blocks: Counter,
    pub(crate) grown_blocks: Counter,
    pub(crate) shrunk_blocks: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) resize_failures: Counter,
}
impl BlockPoolMetrics {
    /// プールが管理するブロックの総数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_capacity_blocks <GAUGE>
    /// ```
    pub fn capacity_blocks(&self) -> u64 {
        self.capacity_blocks.value() as u64
    }

    /// 部分領域の割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_allocated_spans_total <COUNTER>
    /// ```
    pub fn allocated_spans(&self) -> u64 {
        self.allocated_spans.value() as u64
    }

    /// 割当によって使用中になったブロックの数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_allocated_blocks_total <COUNTER>
    /// ```
    pub fn allocated_blocks(&self) -> u64 {
        self.allocated_blocks.value() as u64
    }

    /// 部分領域の解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_released_spans_total <COUNTER>
    /// ```
    pub fn released_spans(&self) -> u64 {
        self.released_spans.value() as u64
    }

    /// 解放によって空きになったブロックの数の合計.
    ///
    /// `free_all()`による一括解放の分も含まれる.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_released_blocks_total <COUNTER>
    /// ```
    pub fn released_blocks(&self) -> u64 {
        self.released_blocks.value() as u64
    }

    /// リサイズ(拡張)によって使用中になったブロックの数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_grown_blocks_total <COUNTER>
    /// ```
    pub fn grown_blocks(&self) -> u64 {
        self.grown_blocks.value() as u64
    }

    /// リサイズ(縮小)によって空きになったブロックの数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_shrunk_blocks_total <COUNTER>
    /// ```
    pub fn shrunk_blocks(&self) -> u64 {
        self.shrunk_blocks.value() as u64
    }

    /// 空き領域不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// その場での拡張ができなかったことによるリサイズ失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_resize_failures_total <COUNTER>
    /// ```
    pub fn resize_failures(&self) -> u64 {
        self.resize_failures.value() as u64
    }

    /// 使用中のブロック数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_block_pool_allocated_blocks_total + blockalloc_block_pool_grown_blocks_total
    ///   - blockalloc_block_pool_released_blocks_total - blockalloc_block_pool_shrunk_blocks_total
    /// ```
    pub fn usage_blocks(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_blocks() + self.shrunk_blocks();
        let inc = self.allocated_blocks() + self.grown_blocks();
        inc - dec
    }

    pub(crate) fn new(builder: &MetricBuilder, block_count: usize) -> Self {
        let mut builder = builder.clone();
        builder.namespace("blockalloc").subsystem("block_pool");
        let metrics = BlockPoolMetrics {
            capacity_blocks: builder
                .gauge("capacity_blocks")
                .help("Number of blocks managed by the pool")
                .finish()
                .expect("Never fails"),
            allocated_spans: builder
                .counter("allocated_spans_total")
                .help("Number of allocated spans")
                .finish()
                .expect("Never fails"),
            allocated_blocks: builder
                .counter("allocated_blocks_total")
                .help("Number of blocks claimed by allocations")
                .finish()
                .expect("Never fails"),
            released_spans: builder
                .counter("released_spans_total")
                .help("Number of released spans")
                .finish()
                .expect("Never fails"),
            released_blocks: builder
                .counter("released_blocks_total")
                .help("Number of blocks released by frees")
                .finish()
                .expect("Never fails"),
            grown_blocks: builder
                .counter("grown_blocks_total")
                .help("Number of blocks claimed by in-place growth")
                .finish()
                .expect("Never fails"),
            shrunk_blocks: builder
                .counter("shrunk_blocks_total")
                .help("Number of blocks released by in-place shrinking")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available run of blocks")
                .finish()
                .expect("Never fails"),
            resize_failures: builder
                .counter("resize_failures_total")
                .help("Number of growth failures caused by occupied trailing blocks")
                .finish()
                .expect("Never fails"),
        };
        metrics.capacity_blocks.set(block_count as f64);
        metrics
    }

    pub(crate) fn count_allocation(&self, blocks: usize) {
        self.allocated_spans.increment();
        self.allocated_blocks.add_u64(blocks as u64);
    }

    pub(crate) fn count_releasion(&self, blocks: usize) {
        self.released_spans.increment();
        self.released_blocks.add_u64(blocks as u64);
    }
}

/// [`CompositeAllocator`]のメトリクス.
///
/// [`CompositeAllocator`]: ../composite/struct.CompositeAllocator.html
#[derive(Debug, Clone)]
pub struct CompositeMetrics {
    pub(crate) routed_allocations: Counter,
    pub(crate) unroutable_allocations: Counter,
    pub(crate) crossing_resizes: Counter,
}
impl CompositeMetrics {
    /// いずれかのバケツに転送された割当要求の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_composite_routed_allocations_total <COUNTER>
    /// ```
    pub fn routed_allocations(&self) -> u64 {
        self.routed_allocations.value() as u64
    }

    /// 該当するバケツが存在しなかった割当要求の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_composite_unroutable_allocations_total <COUNTER>
    /// ```
    pub fn unroutable_allocations(&self) -> u64 {
        self.unroutable_allocations.value() as u64
    }

    /// バケツの境界を跨ぐために拒否されたリサイズ要求の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// blockalloc_composite_crossing_resizes_total <COUNTER>
    /// ```
    pub fn crossing_resizes(&self) -> u64 {
        self.crossing_resizes.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("blockalloc").subsystem("composite");
        CompositeMetrics {
            routed_allocations: builder
                .counter("routed_allocations_total")
                .help("Number of allocation requests forwarded to a bucket")
                .finish()
                .expect("Never fails"),
            unroutable_allocations: builder
                .counter("unroutable_allocations_total")
                .help("Number of allocation requests matching no bucket")
                .finish()
                .expect("Never fails"),
            crossing_resizes: builder
                .counter("crossing_resizes_total")
                .help("Number of resize requests rejected for crossing a bucket boundary")
                .finish()
                .expect("Never fails"),
        }
    }
}
