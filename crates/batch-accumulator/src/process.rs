use std::future::Future;

/// The outcome of processing a batch
#[derive(Debug)]
pub enum BatchOutput<V, E> {
  /// Every item of the batch resolves with `V::default()`
  Uniform,
  /// Per-item outcomes aligned by index with the batch. Items beyond the end of this vec resolve
  /// with `V::default()`
  Each(Vec<Result<V, E>>),
}

impl<V, E> BatchOutput<V, E> {
  /// Outcomes for a batch in which every item succeeded
  pub fn values<I>(values: I) -> Self
  where
    I: IntoIterator<Item = V>,
  {
    BatchOutput::Each(values.into_iter().map(Ok).collect())
  }
}

impl<V, E> From<()> for BatchOutput<V, E> {
  fn from(_: ()) -> Self {
    BatchOutput::Uniform
  }
}

impl<V, E> From<Vec<Result<V, E>>> for BatchOutput<V, E> {
  fn from(results: Vec<Result<V, E>>) -> Self {
    BatchOutput::Each(results)
  }
}

impl<V, E> FromIterator<Result<V, E>> for BatchOutput<V, E> {
  fn from_iter<I: IntoIterator<Item = Result<V, E>>>(iter: I) -> Self {
    BatchOutput::Each(iter.into_iter().collect())
  }
}

/// Processes released batches on behalf of an [`Accumulator`](crate::Accumulator).
///
/// Items are given in submission order. Returning `Err` fails every item of the batch with that
/// error, whereas [`BatchOutput::Each`] can fail items individually without affecting the rest of
/// the batch. This is implemented for any `Fn(Vec<T>) -> impl Future` closure.
pub trait Process<T>: Send + Sync + 'static {
  /// Items given no explicit outcome, by [`BatchOutput::Uniform`] or a short result list, resolve
  /// to the default value. Types without one can be wrapped in an `Option`.
  type Value: Default + Send + 'static;
  type Error: Send + Sync + 'static;

  fn process(
    &self,
    items: Vec<T>,
  ) -> impl Future<Output = Result<BatchOutput<Self::Value, Self::Error>, Self::Error>> + Send;
}

impl<T, F, Fut, V, E> Process<T> for F
where
  F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<BatchOutput<V, E>, E>> + Send,
  V: Default + Send + 'static,
  E: Send + Sync + 'static,
{
  type Value = V;
  type Error = E;

  fn process(&self, items: Vec<T>) -> impl Future<Output = Result<BatchOutput<V, E>, E>> + Send {
    (self)(items)
  }
}
