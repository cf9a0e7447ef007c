//! Address decoding for cache lookups

use super::cache::get_mask;

/// A raw address split into cache lookup fields.
///
/// Layout (from the most significant bit):
/// `| tag | set index (index_bits) | word in block (block_bits) | byte (2) |`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodedAddress {
    pub full_address: u32,
    pub tag: u32,
    pub cache_set_index: usize,
    /// Word index within the block
    pub block_offset: usize,
    /// Byte index within the word
    pub byte_offset: u32,
    pub block_aligned_address: u32,
    pub word_aligned_address: u32,
}

impl DecodedAddress {
    pub fn new(index_bits: u32, block_bits: u32, full_address: u32) -> Self {
        let byte_offset = full_address & 0b11;
        let block_offset = (full_address >> 2) & get_mask(block_bits);
        let cache_set_index = full_address
            .checked_shr(block_bits + 2)
            .map_or(0, |rest| rest & get_mask(index_bits));
        let tag = full_address.checked_shr(index_bits + block_bits + 2).unwrap_or(0);

        Self {
            full_address,
            tag,
            cache_set_index: cache_set_index as usize,
            block_offset: block_offset as usize,
            byte_offset,
            block_aligned_address: full_address & !get_mask(block_bits + 2),
            word_aligned_address: full_address & !0b11,
        }
    }

    /// Address of the `i`-th word of the block this address lies in
    pub fn word_in_block(&self, i: usize) -> u32 {
        self.block_aligned_address.wrapping_add(4 * i as u32)
    }
}
