//! Occupancy Bitmap.

use byteorder::{ByteOrder, LittleEndian};
use std::cmp;

const WORD_BYTES: usize = 8;
const WORD_BITS: usize = 64;

/// `bit_count`ビットを保持するビットマップに必要なバイト数を返す.
///
/// 先頭の一ワードはヘッダ(ビット数)用に使われる.
pub fn encoded_size(bit_count: usize) -> usize {
    (1 + (bit_count + WORD_BITS - 1) / WORD_BITS) * WORD_BYTES
}

/// バイト列上に配置された、ブロックの使用状況を表すビットマップ.
///
/// 内部表現は以下の通り(全てリトルエンディアンの`u64`):
///
/// ```text
/// +--------------+--------+--------+-----+
/// | bit count    | word 0 | word 1 | ... |
/// +--------------+--------+--------+-----+
/// ```
///
/// `i`番目のビットは、`i / 64`番目のワードの`i % 64`ビット目に対応する.
/// `1`が使用中、`0`が空きを意味する.
#[derive(Debug)]
pub struct Bitmap<B> {
    bytes: B,
}
impl<B: AsRef<[u8]>> Bitmap<B> {
    /// 既に初期化済みのバイト列をビットマップとして扱う.
    pub fn new(bytes: B) -> Self {
        let bitmap = Bitmap { bytes };
        debug_assert!(bitmap.bytes.as_ref().len() >= encoded_size(bitmap.len()));
        bitmap
    }

    /// ビット数を返す.
    pub fn len(&self) -> usize {
        LittleEndian::read_u64(&self.bytes.as_ref()[..WORD_BYTES]) as usize
    }

    /// `index`番目のビットが立っているかどうかを判定する.
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.len(), "index={}, len={}", index, self.len());
        self.word(index / WORD_BITS) & (1 << (index % WORD_BITS)) != 0
    }

    /// 立っているビットの数を返す.
    pub fn count_ones(&self) -> usize {
        (0..self.word_count())
            .map(|i| self.word(i).count_ones() as usize)
            .sum()
    }

    /// `[start, end)`の範囲で、最初に立っているビットの位置を返す.
    pub fn find_set(&self, start: usize, end: usize) -> Option<usize> {
        self.find(start, end, |w| w)
    }

    /// `[start, end)`の範囲で、最初に立っていないビットの位置を返す.
    pub fn find_clear(&self, start: usize, end: usize) -> Option<usize> {
        self.find(start, end, |w| !w)
    }

    fn find<F>(&self, start: usize, end: usize, f: F) -> Option<usize>
    where
        F: Fn(u64) -> u64,
    {
        let end = cmp::min(end, self.len());
        let mut i = start;
        while i < end {
            let shift = i % WORD_BITS;
            let bits = f(self.word(i / WORD_BITS)) >> shift;
            if bits != 0 {
                let found = i + bits.trailing_zeros() as usize;
                return if found < end { Some(found) } else { None };
            }
            i += WORD_BITS - shift;
        }
        None
    }

    fn word_count(&self) -> usize {
        (self.len() + WORD_BITS - 1) / WORD_BITS
    }

    fn word(&self, i: usize) -> u64 {
        let offset = (i + 1) * WORD_BYTES;
        LittleEndian::read_u64(&self.bytes.as_ref()[offset..offset + WORD_BYTES])
    }
}
impl<B: AsRef<[u8]> + AsMut<[u8]>> Bitmap<B> {
    /// `bytes`の先頭に、全てのビットが`0`のビットマップを書き込む.
    ///
    /// # Panics
    ///
    /// `bytes`の長さが`encoded_size(bit_count)`未満の場合には、現在のスレッドがパニックする.
    pub fn init(mut bytes: B, bit_count: usize) -> Self {
        let size = encoded_size(bit_count);
        assert!(bytes.as_ref().len() >= size);
        {
            let bytes = bytes.as_mut();
            for b in &mut bytes[WORD_BYTES..size] {
                *b = 0;
            }
            LittleEndian::write_u64(&mut bytes[..WORD_BYTES], bit_count as u64);
        }
        Bitmap { bytes }
    }

    /// `[start, start + len)`の範囲のビットを`value`に設定する.
    ///
    /// # Panics
    ///
    /// 範囲がビット数を超えている場合には、現在のスレッドがパニックする.
    pub fn set_range(&mut self, start: usize, len: usize, value: bool) {
        let end = start + len;
        assert!(end <= self.len(), "start={}, len={}", start, len);

        let mut i = start;
        while i < end {
            let shift = i % WORD_BITS;
            let n = cmp::min(WORD_BITS - shift, end - i);
            let mask = if n == WORD_BITS {
                !0
            } else {
                ((1u64 << n) - 1) << shift
            };
            let word = self.word(i / WORD_BITS);
            let word = if value { word | mask } else { word & !mask };
            self.set_word(i / WORD_BITS, word);
            i += n;
        }
    }

    /// 全てのビットを`0`にする.
    pub fn clear_all(&mut self) {
        for i in 0..self.word_count() {
            self.set_word(i, 0);
        }
    }

    fn set_word(&mut self, i: usize, word: u64) {
        let offset = (i + 1) * WORD_BYTES;
        LittleEndian::write_u64(&mut self.bytes.as_mut()[offset..offset + WORD_BYTES], word);
    }
}
