extern crate blockalloc;
extern crate prometrics;
#[macro_use]
extern crate slog;
#[macro_use]
extern crate trackable;

use blockalloc::alloc::{Alignment, Allocator, Span};
use blockalloc::composite::{Bucket, CompositeAllocator, CompositeBuilder};
use blockalloc::pool::{required_buffer_size, BlockPool, BlockPoolBuilder};
use blockalloc::stats::{Counter, StatsAllocator, TrackAll, TrackNone};
use blockalloc::ErrorKind;
use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use trackable::result::TestResult;

fn pool(block_size: usize, block_count: usize) -> BlockPool {
    let buffer = vec![0; required_buffer_size(block_size, block_count)];
    BlockPool::new(buffer, block_size, block_count)
}

#[test]
fn stats_over_composite_over_pools() -> TestResult {
    let small = pool(16, 8);
    let medium = pool(128, 8);
    let large = track!(BlockPoolBuilder::new()
        .block_size(1024)
        .block_count(4)
        .logger(Logger::root(Discard, o!()))
        .create())?;
    let buckets = [
        Bucket::new(0, 16, &small),
        Bucket::new(16, 128, &medium),
        Bucket::unbounded(128, &large),
    ];
    let composite = CompositeBuilder::new()
        .metrics(MetricBuilder::new())
        .finish(&buckets);
    let stats = StatsAllocator::<_, TrackAll>::new(&composite);
    let allocator = stats.allocator();

    let mut a = track!(allocator.allocate(10, Alignment::default()))?;
    let b = track!(allocator.allocate(50, Alignment::default()))?;
    let c = track!(allocator.allocate(1000, Alignment::default()))?;
    assert!(small.owns_span(&a));
    assert!(medium.owns_span(&b));
    assert!(large.owns_span(&c));

    // 同じバケツの範囲内でのリサイズ
    assert!(allocator.resize(&mut a, 15));
    // 別のバケツへの移動は拒否される
    assert!(!allocator.resize(&mut a, 16));
    assert_eq!(a.len(), 15);

    // 境界を跨ぐ場合は、呼び出し元が新規割当・コピー・解放を行う
    let moved = track!(allocator.allocate(40, Alignment::default()))?;
    medium.bytes_mut(&moved)[..15].copy_from_slice(&small.bytes(&a));
    allocator.free(a);

    allocator.free(b);
    allocator.free(c);
    allocator.free(moved);

    assert_eq!(small.usage().used_blocks, 0);
    assert_eq!(medium.usage().used_blocks, 0);
    assert_eq!(large.usage().used_blocks, 0);

    assert_eq!(stats.get(Counter::Allocs), 4);
    assert_eq!(stats.get(Counter::Frees), 4);
    assert_eq!(stats.get(Counter::Resizes), 2);
    assert_eq!(stats.get(Counter::ResizeFailures), 1);
    assert_eq!(stats.bytes_in_use(), 0);
    assert_eq!(stats.get(Counter::BytesHighWaterMark), 10 + 50 + 1000 + 5 + 40);
    assert_eq!(composite.metrics().crossing_resizes(), 1);
    Ok(())
}

#[test]
fn stats_scenario() -> TestResult {
    let backing = pool(16, 4);
    let stats = StatsAllocator::<_, TrackAll>::new(&backing);

    let mut span = track!(stats.allocate(10, Alignment::default()))?;
    assert!(stats.resize(&mut span, 15));
    assert!(stats.resize(&mut span, 5));
    stats.free(span);

    assert_eq!(stats.get(Counter::Allocs), 1);
    assert_eq!(stats.get(Counter::Resizes), 2);
    assert_eq!(stats.get(Counter::BytesGrown), 5);
    assert_eq!(stats.get(Counter::BytesShrunk), 10);
    assert_eq!(stats.get(Counter::BytesFreed), 5);
    assert_eq!(stats.bytes_in_use(), 0);
    assert_eq!(stats.get(Counter::BytesHighWaterMark), 15);
    Ok(())
}

#[test]
fn untracked_handle_is_backing() {
    let backing = pool(16, 4);
    let stats = StatsAllocator::<_, TrackNone>::new(&backing);
    let handle = stats.allocator() as *const _ as *const ();
    assert_eq!(handle, &backing as *const BlockPool as *const ());
}

#[test]
fn pool_scenario() -> TestResult {
    assert_eq!(required_buffer_size(16, 63), 1024);
    let pool = BlockPool::new(vec![0; 1024], 16, 63);
    assert_eq!(pool.usage().used_blocks, 0);
    assert_eq!(pool.usage().free_blocks, 63);

    let first = track!(pool.allocate(4, Alignment::default()))?;
    assert_eq!(pool.usage().used_blocks, 1);
    let second = track!(pool.allocate(18, Alignment::default()))?;
    assert_eq!(pool.usage().used_blocks, 3);
    pool.free(first);
    assert_eq!(pool.usage().used_blocks, 2);
    pool.free(second);
    assert_eq!(pool.usage().used_blocks, 0);
    Ok(())
}

#[test]
fn exhausting_every_pool() {
    let small = pool(8, 2);
    let buckets = [Bucket::unbounded(0, &small)];
    let composite = CompositeAllocator::new(&buckets);

    let spans = (0..2)
        .map(|_| composite.allocate(8, Alignment::default()).unwrap())
        .collect::<Vec<Span>>();
    assert_eq!(
        composite
            .allocate(1, Alignment::default())
            .err()
            .map(|e| *e.kind()),
        Some(ErrorKind::OutOfMemory)
    );
    for span in spans {
        composite.free(span);
    }
    assert!(composite.allocate(16, Alignment::default()).is_ok());
}
