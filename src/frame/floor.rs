use crate::codec::{write_vlong, ScratchBuf};
use crate::error::{IndexError, Result};

const FLAG_IS_FLOOR: u64 = 0x1;
const FLAG_HAS_TERMS: u64 = 0x2;

/// `next_label` once the last follow-on chunk has been consumed.
pub(crate) const NO_MORE_FLOOR: u16 = 256;

/// Leading long of a block's index record: where the (first chunk of the) block
/// lives and what it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockCode {
    pub fp: u64,
    pub has_terms: bool,
    pub is_floor: bool,
}

impl BlockCode {
    pub(crate) fn encode(&self) -> u64 {
        let mut code = self.fp << 2;
        if self.has_terms {
            code |= FLAG_HAS_TERMS;
        }
        if self.is_floor {
            code |= FLAG_IS_FLOOR;
        }
        code
    }

    pub(crate) fn decode(code: u64) -> Self {
        BlockCode {
            fp: code >> 2,
            has_terms: code & FLAG_HAS_TERMS != 0,
            is_floor: code & FLAG_IS_FLOOR != 0,
        }
    }
}

/// Follow-on chunk descriptor written into a floor block's index record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FloorChunk {
    pub lead_label: u8,
    pub fp: u64,
    pub has_terms: bool,
}

/// Serialize an index record: block code followed, for floor blocks, by the
/// follow-on chunk table.
pub(crate) fn encode_index_record(out: &mut Vec<u8>, code: BlockCode, follow: &[FloorChunk]) {
    write_vlong(out, code.encode());
    if code.is_floor {
        write_vlong(out, follow.len() as u64);
        for chunk in follow {
            out.push(chunk.lead_label);
            write_vlong(out, ((chunk.fp - code.fp) << 1) | chunk.has_terms as u64);
        }
    }
}

/// Cursor over the follow-on chunks of a floor block.
#[derive(Debug)]
pub(crate) struct FloorTable {
    data: ScratchBuf,
    fp_orig: u64,
    remaining: u32,
    next_label: u16,
}

impl Default for FloorTable {
    fn default() -> Self {
        FloorTable {
            data: ScratchBuf::default(),
            fp_orig: 0,
            remaining: 0,
            next_label: NO_MORE_FLOOR,
        }
    }
}

impl FloorTable {
    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.remaining = 0;
        self.next_label = NO_MORE_FLOOR;
    }

    /// Start reading `table`, the bytes after the block code of a floor block.
    pub(crate) fn reset(&mut self, table: &[u8], fp_orig: u64) -> Result<()> {
        self.data.reset_from(table);
        self.fp_orig = fp_orig;
        let n = self.data.read_vint()?;
        // Each follow-on chunk needs at least a label byte and a one-byte pointer.
        if n == 0 || (n as usize).saturating_mul(2) > self.data.remaining() {
            return Err(IndexError::Corrupt {
                fp: fp_orig,
                reason: "floor table declares more chunks than it holds",
            });
        }
        self.remaining = n;
        self.next_label = self.data.read_byte()? as u16;
        Ok(())
    }

    /// Leading byte of the next follow-on chunk, or `NO_MORE_FLOOR`.
    #[inline]
    pub(crate) fn next_label(&self) -> u16 {
        self.next_label
    }

    #[inline]
    pub(crate) fn has_more(&self) -> bool {
        self.remaining != 0
    }

    /// Consume the next follow-on chunk and return its file pointer.
    pub(crate) fn advance(&mut self) -> Result<u64> {
        if self.remaining == 0 {
            return Err(IndexError::Corrupt {
                fp: self.fp_orig,
                reason: "chunk is not last in floor but no follow-on chunk remains",
            });
        }
        let code = self.data.read_vlong()?;
        let fp = self
            .fp_orig
            .checked_add(code >> 1)
            .ok_or(IndexError::Corrupt {
                fp: self.fp_orig,
                reason: "floor chunk pointer overflows",
            })?;
        self.remaining -= 1;
        self.next_label = if self.remaining != 0 {
            self.data.read_byte()? as u16
        } else {
            NO_MORE_FLOOR
        };
        Ok(fp)
    }
}
