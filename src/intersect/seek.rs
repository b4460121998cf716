use std::cmp::Ordering;

use super::{run_suffix, IntersectTermsEnum};
use crate::entry::Entry;
use crate::error::Result;
use crate::postings::PostingsReader;

impl<P: PostingsReader> IntersectTermsEnum<'_, P> {
    /// Position the walk so that the first result is the first accepted term
    /// strictly greater than `target`.
    ///
    /// This is a seek-floor: it descends through sub-blocks whose prefix is a
    /// prefix of `target` and stops on the last entry not greater than it,
    /// rewinding one entry on overshoot.
    pub(super) fn seek_to_start_term(&mut self, target: &[u8]) -> Result<()> {
        debug_assert_eq!(self.current, 0);
        let automaton = self.automaton;
        self.term.reserve(target.len());
        loop {
            let frame = &mut self.stack[self.current];
            let prefix = frame.prefix;
            let parent_lead = prefix.checked_sub(1).map(|i| self.term[i]);
            let cursor = frame.snapshot();
            let entry = frame.next(parent_lead)?;

            self.term.truncate(prefix);
            self.term.extend_from_slice(frame.suffix());

            if let Entry::SubBlock { child_fp, .. } = entry {
                if target.starts_with(&self.term) {
                    match run_suffix(automaton, frame.state, frame.last_state, frame.suffix()) {
                        Some((state, last_state)) => {
                            self.push_frame(child_fp, state, last_state)?;
                            continue;
                        }
                        // Nothing under this sub-block matches; resume right after it.
                        None => return Ok(()),
                    }
                }
            }

            let is_auto_prefix = matches!(
                entry,
                Entry::AutoPrefixSimple { .. } | Entry::AutoPrefixFloored { .. }
            );
            match self.term.as_slice().cmp(target) {
                Ordering::Less => {
                    if frame.is_exhausted() {
                        if frame.is_last_in_floor() {
                            return Ok(());
                        }
                        frame.load_next_floor_block(&mut self.input, automaton, self.options.floor_pruning)?;
                    }
                }
                // A concrete term equal to the target follows its auto-prefix entry.
                Ordering::Equal if is_auto_prefix && !frame.is_exhausted() => {}
                Ordering::Equal => return Ok(()),
                Ordering::Greater => {
                    frame.restore(cursor);
                    return Ok(());
                }
            }
        }
    }
}
