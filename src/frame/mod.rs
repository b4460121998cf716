//! Per-depth block readers used by the intersection walk.

mod floor;
mod frame;

pub(crate) use floor::{encode_index_record, BlockCode, FloorChunk};
pub(crate) use frame::Frame;
