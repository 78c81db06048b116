use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::{
  batch::{self, Batch, BatchId, Entry, Registry},
  error::{ConfigError, OversizeError},
  helpers::lock,
  options::{Config, Options},
  process::Process,
  task::{Flush, Pending},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
  Manual,
  Count,
  Size,
  Delay,
  Flush,
  Drop,
}

/// The open batch and every batch not yet completed, guarded together
pub(crate) struct State<T: Send + 'static, V, E> {
  open: Option<Batch<T, V, E>>,
  pub(crate) registry: Registry,
}

impl<T, V, E> Default for State<T, V, E>
where
  T: Send + 'static,
{
  fn default() -> Self {
    State {
      open: None,
      registry: Registry::default(),
    }
  }
}

/// Coalesces individually submitted items into batches, dispatching each released batch to a
/// [`Process`] implementation and routing every per-item outcome back through the [`Pending`]
/// returned at submission.
///
/// A batch is released when [`release`](Accumulator::release) or
/// [`flush`](Accumulator::flush) is called, or once any threshold configured in [`Options`] is
/// crossed. Dispatch happens on the current Tokio runtime.
///
/// Cloning an accumulator shares the same open batch; the open batch is released once the last
/// clone is dropped.
pub struct Accumulator<T: Send + 'static, P: Process<T>> {
  inner: Arc<Inner<T, P>>,
}

struct Inner<T: Send + 'static, P: Process<T>> {
  processor: Arc<P>,
  config: Config<T>,
  state: Arc<Mutex<State<T, P::Value, P::Error>>>,
}

impl<T, P> Clone for Accumulator<T, P>
where
  T: Send + 'static,
  P: Process<T>,
{
  fn clone(&self) -> Self {
    Accumulator {
      inner: self.inner.clone(),
    }
  }
}

impl<T, P> Accumulator<T, P>
where
  T: Send + 'static,
  P: Process<T>,
{
  pub fn new(processor: P, options: Options<T>) -> Result<Self, ConfigError> {
    let config = options.validate()?;

    Ok(Accumulator {
      inner: Arc::new(Inner {
        processor: Arc::new(processor),
        config,
        state: Arc::new(Mutex::new(State::default())),
      }),
    })
  }

  /// Append an item to the open batch, opening a batch as necessary, and release it should a
  /// threshold be crossed.
  ///
  /// When sizing is strict, an item individually larger than `size.max` is rejected without
  /// side effects. Otherwise an item that would overflow the open batch releases it first, and so
  /// oversized items are batched alone.
  pub fn submit(&self, item: T) -> Result<Pending<P::Value, P::Error>, OversizeError> {
    let size = match &self.inner.config.size {
      Some(limit) => {
        let size = limit.measure(&item);

        if limit.strict && size > limit.max {
          return Err(OversizeError {
            size,
            max: limit.max,
          });
        }

        Some((size, limit.max))
      }
      None => None,
    };

    let (slot, pending) = Pending::new();

    let (overflowed, released) = {
      let mut guard = lock(&self.inner.state);
      let state = &mut *guard;

      let overflowed = match size {
        Some((size, max))
          if state
            .open
            .as_ref()
            .is_some_and(|batch| batch.size().saturating_add(size) > max) =>
        {
          state.open.take()
        }
        _ => None,
      };

      let batch = state
        .open
        .get_or_insert_with(|| self.inner.open_batch(&mut state.registry));

      batch.push(Entry::new(item, slot), size.map_or(0, |(size, _)| size));

      trace!(batch = %batch.id, items = batch.len(), "item submitted");

      let trigger = if self
        .inner
        .config
        .count
        .is_some_and(|max| batch.len() >= max)
      {
        Some(Trigger::Count)
      } else if size.is_some_and(|(_, max)| batch.size() >= max) {
        Some(Trigger::Size)
      } else {
        None
      };

      let released = trigger.and_then(|trigger| state.open.take().map(|batch| (batch, trigger)));

      (overflowed, released)
    };

    if let Some(batch) = overflowed {
      self.inner.dispatch(batch, Trigger::Size);
    }

    if let Some((batch, trigger)) = released {
      self.inner.dispatch(batch, trigger);
    }

    Ok(pending)
  }

  /// Close the open batch and dispatch it. This is a no-op if no batch is open.
  pub fn release(&self) {
    let open = lock(&self.inner.state).open.take();

    match open {
      Some(batch) => self.inner.dispatch(batch, Trigger::Manual),
      None => trace!("no open batch to release"),
    }
  }

  /// Release the open batch and wait for it along with every other batch in flight at the time of
  /// calling. Batches opened afterwards are not waited upon. Item failures are only observable
  /// through their respective [`Pending`].
  pub fn flush(&self) -> Flush {
    let (batches, open) = {
      let mut state = lock(&self.inner.state);
      (state.registry.snapshot(), state.open.take())
    };

    if let Some(batch) = open {
      self.inner.dispatch(batch, Trigger::Flush);
    }

    Flush::new(batches)
  }

  /// Number of items in the open batch
  pub fn open_len(&self) -> usize {
    lock(&self.inner.state).open.as_ref().map_or(0, Batch::len)
  }

  /// Number of batches either open or in flight
  pub fn pending_batches(&self) -> usize {
    lock(&self.inner.state).registry.len()
  }
}

impl<T, P> Inner<T, P>
where
  T: Send + 'static,
  P: Process<T>,
{
  fn open_batch(self: &Arc<Self>, registry: &mut Registry) -> Batch<T, P::Value, P::Error> {
    let mut batch = Batch::open(registry, Arc::downgrade(&self.state));

    if let Some(delay) = self.config.delay {
      batch.timer = self.arm_timer(batch.id, delay);
    }

    trace!(batch = %batch.id, "batch opened");

    batch
  }

  fn arm_timer(
    self: &Arc<Self>,
    id: BatchId,
    delay: std::time::Duration,
  ) -> Option<tokio::task::JoinHandle<()>> {
    let inner: Weak<Self> = Arc::downgrade(self);

    match Handle::try_current() {
      Ok(handle) => Some(handle.spawn(async move {
        tokio::time::sleep(delay).await;

        if let Some(inner) = inner.upgrade() {
          inner.release_expired(id);
        }
      })),
      Err(_) => {
        warn!(batch = %id, "delay threshold unavailable outside of a Tokio runtime");
        None
      }
    }
  }

  /// Release the open batch only if it is still the batch this timer was armed for
  fn release_expired(&self, id: BatchId) {
    let expired = {
      let mut state = lock(&self.state);

      if state.open.as_ref().is_some_and(|batch| batch.id.eq(&id)) {
        state.open.take()
      } else {
        None
      }
    };

    if let Some(batch) = expired {
      self.dispatch(batch, Trigger::Delay);
    }
  }

  fn dispatch(&self, mut batch: Batch<T, P::Value, P::Error>, trigger: Trigger) {
    if let Some(timer) = batch.timer.take() {
      if trigger.ne(&Trigger::Delay) {
        timer.abort();
      }
    }

    debug!(
      batch = %batch.id,
      items = batch.len(),
      size = batch.size(),
      ?trigger,
      "releasing batch"
    );

    match Handle::try_current() {
      Ok(handle) => {
        let span = debug_span!("dispatch", batch = %batch.id);
        handle.spawn(batch::dispatch(self.processor.clone(), batch).instrument(span));
      }
      Err(_) => {
        warn!(
          batch = %batch.id,
          items = batch.len(),
          "aborting batch released outside of a Tokio runtime"
        );
      }
    }
  }
}

impl<T, P> Drop for Inner<T, P>
where
  T: Send + 'static,
  P: Process<T>,
{
  fn drop(&mut self) {
    let open = lock(&self.state).open.take();

    if let Some(batch) = open {
      self.dispatch(batch, Trigger::Drop);
    }
  }
}
