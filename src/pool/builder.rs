use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use super::{bitmap, BlockPool};
use crate::{ErrorKind, Result};

/// `BlockPool`のビルダ.
#[derive(Debug, Clone)]
pub struct BlockPoolBuilder {
    block_size: usize,
    block_count: usize,
    metrics: MetricBuilder,
    logger: Logger,
}
impl BlockPoolBuilder {
    /// デフォルト設定で`BlockPoolBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        BlockPoolBuilder {
            block_size: 64,
            block_count: 64,
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// ブロックサイズを設定する.
    ///
    /// 全ての割当は、この値の倍数に切り上げられる.
    ///
    /// デフォルト値は`64`.
    pub fn block_size(&mut self, size: usize) -> &mut Self {
        self.block_size = size;
        self
    }

    /// ブロックの数を設定する.
    ///
    /// デフォルト値は`64`.
    pub fn block_count(&mut self, count: usize) -> &mut Self {
        self.block_count = count;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// プール用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 現在の設定でプールを構築するのに必要なバッファのサイズを返す.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - ブロックサイズまたはブロック数が`0`
    /// - 必要なサイズが`usize`で表現できない
    pub fn required_buffer_size(&self) -> Result<usize> {
        track_assert!(self.block_size >= 1, ErrorKind::InvalidInput);
        track_assert!(self.block_count >= 1, ErrorKind::InvalidInput);
        let size = self
            .block_size
            .checked_mul(self.block_count)
            .and_then(|region| region.checked_add(bitmap::encoded_size(self.block_count)));
        if let Some(size) = size {
            Ok(size)
        } else {
            track_panic!(ErrorKind::InvalidInput; self.block_size, self.block_count);
        }
    }

    /// 呼び出し元が用意した`buffer`を使って、プールを構築する.
    ///
    /// # Errors
    ///
    /// 設定値が不正な場合や、`buffer`の長さが`required_buffer_size()`未満の場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn finish(&self, buffer: Vec<u8>) -> Result<BlockPool> {
        let required = track!(self.required_buffer_size())?;
        track_assert!(buffer.len() >= required, ErrorKind::InvalidInput; buffer.len(), required);

        info!(self.logger, "Block pool is created";
              "block_size" => self.block_size,
              "block_count" => self.block_count,
              "buffer_size" => buffer.len());
        Ok(BlockPool::with_options(
            buffer,
            self.block_size,
            self.block_count,
            &self.metrics,
            self.logger.clone(),
        ))
    }

    /// 必要なサイズのバッファをヒープから新規に確保して、プールを構築する.
    ///
    /// # Errors
    ///
    /// 設定値が不正な場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn create(&self) -> Result<BlockPool> {
        let required = track!(self.required_buffer_size())?;
        track!(self.finish(vec![0; required]))
    }
}
impl Default for BlockPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use trackable::result::TestResult;

    use super::*;
    use crate::alloc::{Alignment, Allocator};
    use crate::ErrorKind;

    #[test]
    fn it_works() -> TestResult {
        let pool = track!(BlockPoolBuilder::new()
            .block_size(16)
            .block_count(63)
            .metrics(MetricBuilder::new())
            .create())?;
        assert_eq!(pool.block_size(), 16);
        assert_eq!(pool.block_count(), 63);
        assert_eq!(pool.usage().free_blocks, 63);

        let span = track!(pool.allocate(100, Alignment::default()))?;
        assert_eq!(pool.usage().used_blocks, 7);
        pool.free(span);
        assert_eq!(pool.into_buffer().len(), 1024);
        Ok(())
    }

    #[test]
    fn caller_supplied_buffer() -> TestResult {
        let mut builder = BlockPoolBuilder::new();
        builder.block_size(8).block_count(10);
        assert_eq!(track!(builder.required_buffer_size())?, 16 + 80);

        let pool = track!(builder.finish(vec![0; 200]))?;
        assert_eq!(pool.usage().total_bytes(), 80);
        assert_eq!(pool.into_buffer().len(), 200);
        Ok(())
    }

    #[test]
    fn invalid_settings() {
        let kind = |r: Result<BlockPool>| r.err().map(|e| *e.kind());

        let mut builder = BlockPoolBuilder::new();
        builder.block_size(16).block_count(63);
        assert_eq!(kind(builder.finish(vec![0; 1023])), Some(ErrorKind::InvalidInput));

        builder.block_size(0);
        assert_eq!(kind(builder.create()), Some(ErrorKind::InvalidInput));

        builder.block_size(16).block_count(0);
        assert_eq!(kind(builder.create()), Some(ErrorKind::InvalidInput));

        builder.block_size(usize::max_value()).block_count(2);
        assert_eq!(kind(builder.create()), Some(ErrorKind::InvalidInput));
    }
}
