use crate::error::Result;

/// Fallible, lending-style counterpart of `Iterator` for dictionary walks.
///
/// Reading a block can fail, so every step returns a `Result`; once a step
/// fails the streamer is expected to report `Ok(None)` afterwards.
pub trait Streamer {
    type Item;

    /// Produce the next item, `Ok(None)` once the walk is over.
    fn next(&mut self) -> Result<Option<Self::Item>>;

    /// Drain the remaining items, stopping at the first error.
    fn collect(mut self) -> Result<Vec<Self::Item>>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        while let Some(item) = self.next()? {
            items.push(item);
        }
        Ok(items)
    }
}

// Lets boxed trait objects be driven like any other streamer.
impl<S> Streamer for Box<S>
where
    S: Streamer + ?Sized,
{
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        (**self).next()
    }
}
