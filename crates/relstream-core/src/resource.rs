//! Resource composition.
//!
//! Close handlers report failures through `Result`. Composing them runs
//! every handler even when earlier ones fail; the first failure becomes the
//! primary error and later ones are attached as suppressed errors.

use relstream_types::{Error, Result};

/// A one-shot teardown action.
pub type CloseHandler = Box<dyn FnOnce() -> Result<()>>;

/// Something that releases resources when closed. Closing twice is a no-op.
pub trait Close {
    /// # Errors
    ///
    /// Returns the failure reported while releasing resources.
    fn close(&mut self) -> Result<()>;
}

/// Run every handler in order.
///
/// # Errors
///
/// Returns the first handler failure, carrying every later failure as
/// suppressed.
pub fn close_all<I>(handlers: I) -> Result<()>
where
    I: IntoIterator<Item = CloseHandler>,
{
    let errors = handlers
        .into_iter()
        .filter_map(|handler| handler().err())
        .collect();
    first_error(errors)
}

/// Combine handlers into one that behaves like [`close_all`].
#[must_use]
pub fn compose(handlers: Vec<CloseHandler>) -> CloseHandler {
    Box::new(move || close_all(handlers))
}

/// Close every resource in order, with [`close_all`] error semantics.
///
/// # Errors
///
/// Returns the first close failure with later ones suppressed.
pub fn close_each(resources: &mut [&mut dyn Close]) -> Result<()> {
    let errors = resources
        .iter_mut()
        .filter_map(|resource| resource.close().err())
        .collect();
    first_error(errors)
}

/// Combine the outcome of an operation with the outcome of the close that
/// followed it. An operation failure stays primary.
///
/// # Errors
///
/// Returns the operation error (with any close error suppressed), or the
/// close error when the operation succeeded.
pub fn finish<T>(outcome: Result<T>, closed: Result<()>) -> Result<T> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close)) => Err(close),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(close)) => Err(primary.with_suppressed(vec![close])),
    }
}

pub(crate) fn first_error(errors: Vec<Error>) -> Result<()> {
    let mut errors = errors.into_iter();
    match errors.next() {
        None => Ok(()),
        Some(primary) => Err(primary.with_suppressed(errors.collect())),
    }
}
