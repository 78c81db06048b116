use std::{
  collections::BTreeMap,
  fmt,
  panic::AssertUnwindSafe,
  sync::{Arc, Mutex, Weak},
};

use futures::{
  channel::oneshot,
  future::{FutureExt, Shared},
};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::{
  accumulator::State,
  error::ItemError,
  helpers::lock,
  process::{BatchOutput, Process},
  task::Slot,
};

/// Completion signal of a batch; resolves once every entry of the batch has been settled
pub(crate) type Completion = Shared<oneshot::Receiver<()>>;

/// Identity of a batch, unique per accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct BatchId(u64);

impl fmt::Display for BatchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub(crate) struct Entry<T, V, E> {
  item: T,
  slot: Slot<V, E>,
}

impl<T, V, E> Entry<T, V, E> {
  pub(crate) fn new(item: T, slot: Slot<V, E>) -> Self {
    Entry { item, slot }
  }
}

/// Every batch that is open or in flight
#[derive(Default)]
pub(crate) struct Registry {
  batches: BTreeMap<BatchId, Completion>,
  next_id: u64,
}

impl Registry {
  fn register(&mut self) -> (BatchId, oneshot::Sender<()>) {
    let id = BatchId(self.next_id);
    self.next_id += 1;

    let (tx, rx) = oneshot::channel();
    self.batches.insert(id, rx.shared());

    (id, tx)
  }

  pub(crate) fn snapshot(&self) -> Vec<Completion> {
    self.batches.values().cloned().collect()
  }

  pub(crate) fn len(&self) -> usize {
    self.batches.len()
  }
}

/// Deregisters a batch and then fires its completion signal when dropped. Dispatch holds this until
/// every entry is settled, and unwinding or dropping an undispatched batch fires it all the same.
pub(crate) struct CompletionGuard<T: Send + 'static, V, E> {
  id: BatchId,
  state: Weak<Mutex<State<T, V, E>>>,
  _signal: oneshot::Sender<()>,
}

impl<T, V, E> Drop for CompletionGuard<T, V, E>
where
  T: Send + 'static,
{
  fn drop(&mut self) {
    // The signal fires after this returns, as fields drop after the guard itself
    if let Some(state) = self.state.upgrade() {
      lock(&state).registry.batches.remove(&self.id);
    }
  }
}

/// An ordered accumulation of entries. While open this is held as the current batch of an
/// accumulator; once detached it is dispatched exactly once.
pub(crate) struct Batch<T: Send + 'static, V, E> {
  pub(crate) id: BatchId,
  entries: Vec<Entry<T, V, E>>,
  size: usize,
  pub(crate) timer: Option<JoinHandle<()>>,
  guard: CompletionGuard<T, V, E>,
}

impl<T, V, E> Batch<T, V, E>
where
  T: Send + 'static,
{
  /// Register a new empty batch
  pub(crate) fn open(registry: &mut Registry, state: Weak<Mutex<State<T, V, E>>>) -> Self {
    let (id, signal) = registry.register();

    Batch {
      id,
      entries: Vec::new(),
      size: 0,
      timer: None,
      guard: CompletionGuard {
        id,
        state,
        _signal: signal,
      },
    }
  }

  #[inline(always)]
  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline(always)]
  pub(crate) fn size(&self) -> usize {
    self.size
  }

  pub(crate) fn push(&mut self, entry: Entry<T, V, E>, size: usize) {
    self.entries.push(entry);
    self.size = self.size.saturating_add(size);
  }
}

/// Invoke the processing function with the items of `batch` and settle every entry with the
/// outcome. Entries are settled strictly before the completion signal fires.
pub(crate) async fn dispatch<T, P>(processor: Arc<P>, batch: Batch<T, P::Value, P::Error>)
where
  T: Send + 'static,
  P: Process<T>,
{
  let Batch {
    id, entries, guard, ..
  } = batch;

  let (items, slots): (Vec<T>, Vec<Slot<P::Value, P::Error>>) = entries
    .into_iter()
    .map(|entry| (entry.item, entry.slot))
    .unzip();

  let len = slots.len();

  let outcome = AssertUnwindSafe(async move { processor.process(items).await })
    .catch_unwind()
    .await;

  match outcome {
    Ok(Ok(BatchOutput::Uniform)) => {
      for slot in slots {
        slot.send(Ok(P::Value::default())).ok();
      }
    }
    Ok(Ok(BatchOutput::Each(results))) => {
      if results.len() < len {
        trace!(batch = %id, results = results.len(), items = len, "defaulting missing results");
      } else if results.len() > len {
        warn!(batch = %id, results = results.len(), items = len, "discarding surplus results");
      }

      let mut results = results.into_iter();

      for slot in slots {
        let outcome = match results.next() {
          Some(Ok(value)) => Ok(value),
          Some(Err(err)) => Err(ItemError::Item(err)),
          None => Ok(P::Value::default()),
        };

        slot.send(outcome).ok();
      }
    }
    Ok(Err(err)) => {
      debug!(batch = %id, items = len, "batch failed");

      let err = Arc::new(err);

      for slot in slots {
        slot.send(Err(ItemError::Batch(err.clone()))).ok();
      }
    }
    Err(_) => {
      error!(batch = %id, items = len, "processing function panicked");

      for slot in slots {
        slot.send(Err(ItemError::Aborted)).ok();
      }
    }
  }

  debug!(batch = %id, items = len, "batch completed");

  drop(guard);
}
