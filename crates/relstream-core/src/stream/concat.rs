use std::collections::VecDeque;

use super::{ErrorLatch, Flow, Stream};
use crate::resource::compose;

/// Concatenate `streams` into one stream that, when closed, closes every
/// input, whether or not it was ever pulled from.
#[must_use]
pub fn concat_and_auto_close<T, I>(streams: I) -> Stream<T>
where
    T: 'static,
    I: IntoIterator<Item = Stream<T>>,
{
    let mut streams: Vec<Stream<T>> = streams.into_iter().collect();
    let closers = streams
        .iter()
        .map(|stream| {
            let closer = stream.closer();
            Box::new(move || closer.close()) as crate::resource::CloseHandler
        })
        .collect();

    Stream::from_source(
        None,
        Box::new(move |_, ctx| {
            let mut parts = VecDeque::with_capacity(streams.len());
            for stream in &mut streams {
                let (flow, latch) = stream.iter()?.into_parts();
                if let Some(flow) = flow {
                    parts.push_back((flow, latch));
                }
            }
            let flow = Concat {
                parts,
                latch: ctx.latch().clone(),
            };
            Ok((Box::new(flow) as Flow<T>, 0))
        }),
    )
    .on_close(compose(closers))
}

struct Concat<T> {
    parts: VecDeque<(Flow<T>, ErrorLatch)>,
    latch: ErrorLatch,
}

impl<T> Iterator for Concat<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            let (flow, latch) = self.parts.front_mut()?;
            if let Some(item) = flow.next() {
                return Some(item);
            }
            if let Some(err) = latch.take() {
                self.latch.set(err);
                self.parts.clear();
                return None;
            }
            self.parts.pop_front();
        }
    }
}
