//! Prefix walks over the block index FST.

use fst::raw::{CompiledAddr, Fst, Output};

use crate::storage::SharedMmap;

/// Position reached in the index FST: a node address plus the output
/// accumulated on the way there.
#[derive(Clone, Copy, Debug)]
pub(crate) struct IndexArc {
    pub addr: CompiledAddr,
    pub output: Output,
}

impl IndexArc {
    pub(crate) fn root(fst: &Fst<SharedMmap>) -> Self {
        IndexArc {
            addr: fst.root().addr(),
            output: Output::zero(),
        }
    }

    /// Follow `bytes` from this arc; `None` if some label has no transition.
    pub(crate) fn walk(self, fst: &Fst<SharedMmap>, bytes: &[u8]) -> Option<IndexArc> {
        let mut node = fst.node(self.addr);
        let mut out = self.output;
        for &b in bytes {
            let idx = node.find_input(b)?;
            let tr = node.transition(idx);
            out = out.cat(tr.out);
            node = fst.node(tr.addr);
        }
        Some(IndexArc {
            addr: node.addr(),
            output: out,
        })
    }

    /// The value stored for the prefix ending here, if the node is final.
    pub(crate) fn final_value(&self, fst: &Fst<SharedMmap>) -> Option<u64> {
        let node = fst.node(self.addr);
        node.is_final()
            .then(|| self.output.cat(node.final_output()).value())
    }
}
