use std::sync::Arc;

use thiserror::Error;

/// Rejection of [`Options`](crate::Options) at construction time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("count.max must be a number >= 1")]
  InvalidCount,
  #[error("delay.max must be a number >= 0")]
  InvalidDelay,
  #[error("size.max must be a number")]
  InvalidSizeMax,
  #[error("if size.max is provided, size.calculate must also be provided")]
  MissingCalculate,
}

/// An item measured larger than `size.max` while sizing is strict. The item was not enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("item of size {size} exceeds size.max of {max}")]
pub struct OversizeError {
  pub size: usize,
  pub max: usize,
}

/// Failure delivered to an individual item future
#[derive(Debug, Error)]
pub enum ItemError<E> {
  /// The processing function failed the whole batch; every item of the batch shares this error
  #[error("batch failed: {0}")]
  Batch(Arc<E>),
  /// The processing function marked this item as failed
  #[error("item failed: {0}")]
  Item(E),
  /// The batch was never settled, either because the processing function panicked or because the
  /// batch was dropped before dispatch
  #[error("batch aborted before the item was settled")]
  Aborted,
}

impl<E> ItemError<E> {
  /// The underlying error, if one was produced by the processing function
  pub fn error(&self) -> Option<&E> {
    match self {
      ItemError::Batch(err) => Some(err.as_ref()),
      ItemError::Item(err) => Some(err),
      ItemError::Aborted => None,
    }
  }

  pub fn is_aborted(&self) -> bool {
    matches!(self, ItemError::Aborted)
  }
}
