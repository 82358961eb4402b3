//! Block-table addressing for the paged KV cache.
//!
//! The cache is split into fixed-size physical blocks, much like pages in a
//! virtual memory system. Each sequence keeps a block table mapping its
//! logical blocks to physical ones:
//!
//! ```text
//!   position p ──► (p / block_size, p % block_size)
//!                        │                 │
//!                        ▼                 │
//!              block_table[logical]        │
//!                        │                 │
//!                        ▼                 ▼
//!           slot = physical * block_size + offset
//! ```

use tracing::error;

use crate::error::{Error, Result};

/// Physical block number as stored in a block table.
///
/// Negative values mark an entry with no physical block behind it.
pub type PhysicalBlockId = i32;

/// Sentinel for a block table entry the allocator has not filled.
pub const UNALLOCATED_BLOCK: PhysicalBlockId = -1;

/// Result of translating one logical position to cache storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAddress {
    /// Logical block holding the position (`position / block_size`).
    pub logical_block: usize,
    /// Offset within the block (`position % block_size`).
    pub block_offset: usize,
    /// Physical block the table maps the logical block to.
    pub physical_block: PhysicalBlockId,
    /// Flat physical slot index.
    pub slot: i32,
}

/// Translate a logical sequence position into a flat cache slot.
///
/// # Errors
///
/// - [`Error::Config`] if `block_size` is zero.
/// - [`Error::BlockTableOverflow`] if the table does not reach the position.
/// - [`Error::UnallocatedBlock`] if the entry is negative.
/// - [`Error::SlotOutOfRange`] if the slot does not fit in an `i32`.
///
/// # Example
///
/// ```
/// use paged_seq::core::block::translate;
///
/// let addr = translate(8, &[7, 2, 1], 4).unwrap();
/// assert_eq!(addr.logical_block, 2);
/// assert_eq!(addr.block_offset, 0);
/// assert_eq!(addr.slot, 4);
/// ```
pub fn translate(
    position: usize,
    block_table: &[PhysicalBlockId],
    block_size: usize,
) -> Result<SlotAddress> {
    if block_size == 0 {
        return Err(Error::Config("block_size must be positive".to_string()));
    }

    let logical_block = position / block_size;
    let block_offset = position % block_size;

    let Some(&physical_block) = block_table.get(logical_block) else {
        error!(
            position,
            logical_block,
            num_blocks = block_table.len(),
            "block table does not cover position"
        );
        return Err(Error::BlockTableOverflow {
            logical_block,
            num_blocks: block_table.len(),
        });
    };

    if physical_block < 0 {
        error!(position, logical_block, physical_block, "unallocated block in table");
        return Err(Error::UnallocatedBlock {
            logical_block,
            physical_block,
        });
    }

    let block_size_i64 = i64::try_from(block_size)
        .map_err(|_| Error::Config(format!("block_size {block_size} does not fit in i64")))?;
    // block_offset < block_size, so it fits once block_size does.
    let slot = i64::from(physical_block)
        .checked_mul(block_size_i64)
        .and_then(|base| base.checked_add(block_offset as i64))
        .ok_or(Error::SlotOutOfRange { slot: i64::MAX })?;
    let slot = i32::try_from(slot).map_err(|_| Error::SlotOutOfRange { slot })?;

    Ok(SlotAddress {
        logical_block,
        block_offset,
        physical_block,
        slot,
    })
}

/// Maps a sequence's logical blocks to physical block IDs.
///
/// Token at position `p` lives in physical block `block_ids[p / block_size]`
/// at offset `p % block_size`.
///
/// # Example
///
/// ```
/// use paged_seq::core::block::BlockTable;
///
/// let mut table = BlockTable::new(16);
/// table.append_block(5);   // Tokens 0-15
/// table.append_block(12);  // Tokens 16-31
/// table.append_block(3);   // Tokens 32-47
///
/// // Token 20 -> logical block 1 -> physical block 12
/// assert_eq!(table.get_block_id(1).unwrap(), 12);
/// assert_eq!(table.translate(20).unwrap().slot, 12 * 16 + 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTable {
    /// Physical block IDs in logical order.
    block_ids: Vec<PhysicalBlockId>,
    /// Number of tokens per block.
    block_size: usize,
}

impl BlockTable {
    /// Create a new empty block table.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_ids: Vec::new(),
            block_size,
        }
    }

    /// Create a block table from already-assigned physical blocks.
    pub fn from_blocks(block_size: usize, block_ids: Vec<PhysicalBlockId>) -> Self {
        Self {
            block_ids,
            block_size,
        }
    }

    /// Get the block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Get physical block ID for a logical block index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockTableOverflow`] if the logical block index
    /// is not allocated.
    pub fn get_block_id(&self, logical_block_idx: usize) -> Result<PhysicalBlockId> {
        self.block_ids
            .get(logical_block_idx)
            .copied()
            .ok_or(Error::BlockTableOverflow {
                logical_block: logical_block_idx,
                num_blocks: self.block_ids.len(),
            })
    }

    /// Add a new physical block to the table.
    pub fn append_block(&mut self, block_id: PhysicalBlockId) {
        self.block_ids.push(block_id);
    }

    /// Number of blocks in the table.
    pub fn num_blocks(&self) -> usize {
        self.block_ids.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.block_ids.is_empty()
    }

    /// Physical block IDs in logical order.
    pub fn as_slice(&self) -> &[PhysicalBlockId] {
        &self.block_ids
    }

    /// Whether the table has enough entries for `seq_len` tokens.
    ///
    /// Only counts entries; a negative entry still fails at translation.
    pub fn covers(&self, seq_len: usize) -> bool {
        self.block_size > 0 && self.block_ids.len() * self.block_size >= seq_len
    }

    /// Translate one position through this table.
    pub fn translate(&self, position: usize) -> Result<SlotAddress> {
        translate(position, &self.block_ids, self.block_size)
    }

    /// Slot indices for every token position `0..seq_len`.
    ///
    /// Used when writing a whole prompt's KV states to the cache.
    ///
    /// # Errors
    ///
    /// Fails on the first position the table cannot translate.
    pub fn slot_mapping(&self, seq_len: usize) -> Result<Vec<i32>> {
        (0..seq_len)
            .map(|pos| self.translate(pos).map(|addr| addr.slot))
            .collect()
    }
}

/// Compute number of blocks needed for a sequence of given length.
///
/// # Example
///
/// ```
/// use paged_seq::core::block::compute_num_blocks;
///
/// assert_eq!(compute_num_blocks(35, 16), 3);  // 35 tokens -> 3 blocks
/// assert_eq!(compute_num_blocks(32, 16), 2);  // 32 tokens -> 2 blocks exactly
/// assert_eq!(compute_num_blocks(0, 16), 0);   // 0 tokens -> 0 blocks
/// ```
pub fn compute_num_blocks(seq_len: usize, block_size: usize) -> usize {
    seq_len.div_ceil(block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_formula() {
        let table = [3, 9, 0, 5];
        let block_size = 4;
        for position in 0..16 {
            let addr = translate(position, &table, block_size).unwrap();
            let expected = table[position / block_size] * block_size as i32
                + (position % block_size) as i32;
            assert_eq!(addr.slot, expected);
            assert!(addr.block_offset < block_size);
        }
    }

    #[test]
    fn test_translate_block_boundary() {
        let addr = translate(4, &[10, 20], 4).unwrap();
        assert_eq!(addr.logical_block, 1);
        assert_eq!(addr.block_offset, 0);
        assert_eq!(addr.slot, 80);
    }

    #[test]
    fn test_translate_overflow() {
        let err = translate(8, &[1, 2], 4).unwrap_err();
        assert!(matches!(
            err,
            Error::BlockTableOverflow {
                logical_block: 2,
                num_blocks: 2
            }
        ));
    }

    #[test]
    fn test_translate_unallocated() {
        let err = translate(5, &[1, UNALLOCATED_BLOCK], 4).unwrap_err();
        assert!(matches!(
            err,
            Error::UnallocatedBlock {
                logical_block: 1,
                physical_block: -1
            }
        ));
    }

    #[test]
    fn test_translate_zero_block_size() {
        assert!(matches!(translate(0, &[1], 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_translate_slot_out_of_range() {
        let err = translate(0, &[i32::MAX], 16).unwrap_err();
        assert!(matches!(err, Error::SlotOutOfRange { .. }));
    }

    #[test]
    fn test_translate_slot_overflow_is_error() {
        let err = translate(0, &[1 << 30], 1usize << 40).unwrap_err();
        assert!(matches!(err, Error::SlotOutOfRange { .. }));

        let err = translate((1usize << 40) + 3, &[0, i32::MAX], 1usize << 40).unwrap_err();
        assert!(matches!(err, Error::SlotOutOfRange { .. }));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_translate_block_size_beyond_i64() {
        let err = translate(0, &[1], usize::MAX).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_block_table_covers() {
        let table = BlockTable::from_blocks(4, vec![1, 2]);
        assert!(table.covers(8));
        assert!(!table.covers(9));
        assert!(!BlockTable::new(0).covers(0));
    }

    #[test]
    fn test_block_table_slot_mapping() {
        let table = BlockTable::from_blocks(16, vec![5, 12]);
        let slots = table.slot_mapping(20).unwrap();

        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0], 5 * 16);
        assert_eq!(slots[15], 5 * 16 + 15);
        assert_eq!(slots[16], 12 * 16);
        assert_eq!(slots[19], 12 * 16 + 3);

        assert!(table.slot_mapping(33).is_err());
    }
}
