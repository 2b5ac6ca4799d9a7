use std::fmt;

use relstream_types::Result;

use super::{ErrorLatch, Flow, SetCloser};
use crate::resource::Close;

/// Pull iterator returned by [`Stream::iter`](crate::stream::Stream::iter).
///
/// Yields `Ok` elements until the source is exhausted; a fetch or mapping
/// failure is yielded once as `Err` and ends the iteration. The stream set
/// is closed by [`close`](Close::close) or on drop.
pub struct StreamIter<T> {
    flow: Option<Flow<T>>,
    latch: ErrorLatch,
    closer: SetCloser,
    owns_close: bool,
}

impl<T> fmt::Debug for StreamIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamIter")
            .field("exhausted", &self.flow.is_none())
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

impl<T> StreamIter<T> {
    pub(crate) fn new(flow: Flow<T>, latch: ErrorLatch, closer: SetCloser) -> Self {
        Self {
            flow: Some(flow),
            latch,
            closer,
            owns_close: true,
        }
    }

    /// Take the element flow and its error latch, leaving closing to the
    /// caller.
    pub(crate) fn into_parts(mut self) -> (Option<Flow<T>>, ErrorLatch) {
        self.owns_close = false;
        (self.flow.take(), self.latch.clone())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

impl<T> Iterator for StreamIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let flow = self.flow.as_mut()?;
        if let Some(item) = flow.next() {
            return Some(Ok(item));
        }
        self.flow = None;
        self.latch.take().map(Err)
    }
}

impl<T> Close for StreamIter<T> {
    fn close(&mut self) -> Result<()> {
        self.flow = None;
        self.closer.close()
    }
}

impl<T> Drop for StreamIter<T> {
    fn drop(&mut self) {
        if !self.owns_close || self.closer.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "failed to close stream iterator on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::stream::Stream;

    use super::*;

    #[test]
    fn iterates_without_closing_until_asked() {
        let closed = Rc::new(Cell::new(0));
        let flag = Rc::clone(&closed);
        let mut stream = Stream::of(vec![1, 2, 3]).on_close(move || {
            flag.set(flag.get() + 1);
            Ok(())
        });
        let mut iter = stream.iter().unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), 1);
        drop(stream);
        assert_eq!(closed.get(), 0);

        let rest: Vec<i32> = iter.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(rest, vec![2, 3]);
        assert!(iter.next().is_none());
        iter.close().unwrap();
        drop(iter);
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn drop_closes_iterator() {
        let closed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&closed);
        let mut stream = Stream::of(vec![1]).on_close(move || {
            flag.set(true);
            Ok(())
        });
        let iter = stream.iter().unwrap();
        assert!(!iter.is_closed());
        drop(iter);
        assert!(closed.get());
    }

    #[test]
    fn iter_consumes_builder() {
        let mut stream = Stream::of(vec![1]);
        let _iter = stream.iter().unwrap();
        assert!(stream.iter().unwrap_err().is_consumed());
        assert!(stream.count().unwrap_err().is_consumed());
    }
}
