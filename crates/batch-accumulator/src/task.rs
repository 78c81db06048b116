use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
};

use futures::future::JoinAll;
use pin_project::pin_project;
use tokio::sync::oneshot;

use crate::{batch::Completion, error::ItemError};

pub(crate) type Slot<V, E> = oneshot::Sender<Result<V, ItemError<E>>>;

/// The eventual outcome of a submitted item, resolved once the batch containing it has been
/// processed. Dropping this discards the outcome but does not withdraw the item from its batch.
#[pin_project]
#[must_use = "the outcome of a submitted item is only observable by awaiting it"]
pub struct Pending<V, E> {
  #[pin]
  rx: oneshot::Receiver<Result<V, ItemError<E>>>,
}

impl<V, E> Pending<V, E> {
  pub(crate) fn new() -> (Slot<V, E>, Self) {
    let (tx, rx) = oneshot::channel();

    (tx, Pending { rx })
  }
}

impl<V, E> Future for Pending<V, E> {
  type Output = Result<V, ItemError<E>>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match self.project().rx.poll(cx) {
      Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
      // The slot was dropped without being settled
      Poll::Ready(Err(_)) => Poll::Ready(Err(ItemError::Aborted)),
      Poll::Pending => Poll::Pending,
    }
  }
}

/// A point-in-time barrier over every batch that was open or in flight when
/// [`Accumulator::flush`](crate::Accumulator::flush) was called
#[pin_project]
#[must_use = "flush only waits for pending batches when awaited"]
pub struct Flush {
  #[pin]
  batches: JoinAll<Completion>,
}

impl Flush {
  pub(crate) fn new(batches: Vec<Completion>) -> Self {
    Flush {
      batches: futures::future::join_all(batches),
    }
  }
}

impl Future for Flush {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.project().batches.poll(cx).map(|_| ())
  }
}
