use super::{IntersectTermsEnum, ScanState};
use crate::error::Result;
use crate::postings::PostingsReader;

/// Terms covered by an emitted auto-prefix term: the first `base_len` bytes of
/// the emitted term, followed by a byte in `[lead_start, lead_end]` (or nothing,
/// when `includes_prefix`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SkipRange {
    pub base_len: usize,
    pub lead_start: u8,
    pub lead_end: u8,
    pub includes_prefix: bool,
}

impl SkipRange {
    /// Does the entry `term[..prefix] + suffix` fall in the range?
    ///
    /// `term` still holds the emitted auto-prefix term, and `prefix` never
    /// exceeds its length.
    fn covers(&self, term: &[u8], prefix: usize, suffix: &[u8]) -> bool {
        let base = &term[..self.base_len];
        let lead = if prefix > self.base_len {
            Some(term[self.base_len])
        } else {
            let rest = &base[prefix..];
            if !suffix.starts_with(rest) {
                return false;
            }
            suffix.get(rest.len()).copied()
        };
        match lead {
            Some(b) => (self.lead_start..=self.lead_end).contains(&b),
            None => self.includes_prefix,
        }
    }
}

impl<P: PostingsReader> IntersectTermsEnum<'_, P> {
    /// Pass over every entry covered by the auto-prefix term just returned.
    ///
    /// Entries are sorted, so the covered ones form one run right after the
    /// auto-prefix entry; the run may continue into later floor chunks and, once
    /// a frame whose prefix extends the covered base is exhausted, into its parent.
    pub(super) fn skip_auto_prefix(&mut self, range: SkipRange) -> Result<()> {
        let automaton = self.automaton;
        let frame = &self.stack[self.current];

        // The emitted term is this frame's own prefix; when its range spans the
        // whole block the frame can be dropped without reading it.
        if frame.suffix().is_empty() {
            let whole_block = if range.includes_prefix {
                range.lead_end == u8::MAX
            } else {
                true
            };
            if whole_block {
                let popped_prefix = frame.prefix;
                self.pop_frame();
                if popped_prefix <= range.base_len || self.scan == ScanState::Exhausted {
                    return Ok(());
                }
            }
        }

        loop {
            let frame = &mut self.stack[self.current];
            if frame.is_exhausted() {
                if !frame.is_last_in_floor() {
                    frame.load_next_floor_block(&mut self.input, automaton, self.options.floor_pruning)?;
                    continue;
                }
                let popped_prefix = frame.prefix;
                self.pop_frame();
                // A frame whose prefix is within the base holds every covered term.
                if popped_prefix <= range.base_len || self.scan == ScanState::Exhausted {
                    return Ok(());
                }
                continue;
            }

            let prefix = frame.prefix;
            let parent_lead = prefix.checked_sub(1).map(|i| self.term[i]);
            let cursor = frame.snapshot();
            frame.next(parent_lead)?;
            if !range.covers(&self.term, prefix, frame.suffix()) {
                frame.restore(cursor);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_range_covers_extensions_of_base() {
        let r = SkipRange {
            base_len: 2,
            lead_start: 0,
            lead_end: 0xff,
            includes_prefix: true,
        };
        let term = b"do";
        assert!(r.covers(term, 0, b"do"));
        assert!(r.covers(term, 1, b"og"));
        assert!(r.covers(term, 2, b"t"));
        assert!(!r.covers(term, 1, b"p"));
        assert!(!r.covers(term, 0, b"d"));
    }

    #[test]
    fn floored_range_checks_lead_byte() {
        let r = SkipRange {
            base_len: 2,
            lead_start: b'c',
            lead_end: b'e',
            includes_prefix: false,
        };
        let term = b"abc";
        assert!(r.covers(term, 2, b"c"));
        assert!(r.covers(term, 2, b"dzz"));
        assert!(!r.covers(term, 2, b"f"));
        assert!(!r.covers(term, 2, b""));
        assert!(r.covers(term, 3, b"q"));
        assert!(!r.covers(term, 1, b"c"));
    }
}
