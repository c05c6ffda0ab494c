//! Composable Block Allocators.
//!
//! `blockalloc`は、共通の能力([`Allocator`])の背後に隠された、組み合わせ可能な低レベルアロケータ群を提供する.
//!
//! 単独で動作させることは想定しておらず、より大きなプログラムの部品として組み込んで利用する.
//!
//! # 特徴
//!
//! - 全てのアロケータは「割当・リサイズ・解放」の三操作を、バイト列の部分領域([`Span`])に対して提供する
//! - リサイズは常に「その場」で行われ、再配置は一切行わない
//!   - 失敗した場合には、呼び出し元が新規割当・コピー・解放を行う
//! - 割当の失敗は通常の結果(`ErrorKind::OutOfMemory`)として扱われる
//! - 二重解放や他のアロケータの領域の解放等は、プログラムのバグとみなされパニックする
//! - シングルスレッドでの利用を前提としており、内部で排他制御は行わない
//!
//! # モジュールの依存関係
//!
//! ```text
//! stats => composite => pool => alloc
//! ```
//!
//! - [alloc]モジュール:
//!   - 全てのアロケータが実装する[`Allocator`]トレイトと、[`Span`]や[`Alignment`]を提供
//! - [pool]モジュール:
//!   - 固定長ブロックの並びをビットマップで管理する[`BlockPool`]を提供
//! - [composite]モジュール:
//!   - 要求サイズに応じて他のアロケータに振り分けを行う[`CompositeAllocator`]を提供
//! - [stats]モジュール:
//!   - 呼び出しを転送しつつ、型レベルで選択されたカウンタ群を更新する[`StatsAllocator`]を提供
//!
//! # Examples
//!
//! ```
//! use blockalloc::alloc::{Alignment, Allocator};
//! use blockalloc::composite::{Bucket, CompositeAllocator};
//! use blockalloc::pool::{required_buffer_size, BlockPool};
//! use blockalloc::stats::{Counter, StatsAllocator, TrackAll};
//!
//! let small = BlockPool::new(vec![0; required_buffer_size(16, 64)], 16, 64);
//! let large = BlockPool::new(vec![0; required_buffer_size(256, 16)], 256, 16);
//! let buckets = [Bucket::new(0, 64, &small), Bucket::unbounded(64, &large)];
//! let composite = CompositeAllocator::new(&buckets);
//! let stats = StatsAllocator::<_, TrackAll>::new(&composite);
//!
//! let allocator = stats.allocator();
//! let span = allocator.allocate(100, Alignment::default()).unwrap();
//! assert!(large.owns_span(&span));
//! allocator.free(span);
//! assert_eq!(stats.get(Counter::BytesHighWaterMark), 100);
//! ```
//!
//! [alloc]: ./alloc/index.html
//! [`Allocator`]: ./alloc/trait.Allocator.html
//! [`Span`]: ./alloc/struct.Span.html
//! [`Alignment`]: ./alloc/struct.Alignment.html
//! [pool]: ./pool/index.html
//! [`BlockPool`]: ./pool/struct.BlockPool.html
//! [composite]: ./composite/index.html
//! [`CompositeAllocator`]: ./composite/struct.CompositeAllocator.html
//! [stats]: ./stats/index.html
//! [`StatsAllocator`]: ./stats/struct.StatsAllocator.html
#![warn(missing_docs)]
extern crate byteorder;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

pub mod alloc;
pub mod composite;
pub mod metrics;
pub mod pool;
pub mod stats;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
