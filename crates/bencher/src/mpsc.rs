use std::iter;

use criterion::{measurement::WallTime, BenchmarkGroup, BenchmarkId};
use futures::future::join_all;
use tokio::{
  runtime::Runtime,
  spawn,
  sync::{mpsc, oneshot},
};

type Request = (u64, oneshot::Sender<u64>);

// Batches whatever is buffered whenever the reactor is polled
fn make_reactor() -> mpsc::UnboundedSender<Request> {
  let (tx, mut rx) = mpsc::unbounded_channel::<Request>();

  spawn(async move {
    while let Some(request) = rx.recv().await {
      let batch: Vec<Request> = iter::once(request)
        .chain(iter::from_fn(|| rx.try_recv().ok()))
        .collect();

      for (i, tx) in batch {
        tx.send(i).ok();
      }
    }
  });

  tx
}

async fn push_echo(reactor: mpsc::UnboundedSender<Request>, i: u64) -> u64 {
  let (tx, rx) = oneshot::channel();

  reactor.send((i, tx)).ok();

  rx.await.unwrap()
}

pub fn bench_batching(rt: &Runtime, bench: &mut BenchmarkGroup<WallTime>, batch_size: u64) {
  let reactor = rt.block_on(async { make_reactor() });

  bench.bench_with_input(
    BenchmarkId::new("tokio::mpsc", batch_size),
    &batch_size,
    |b, batch_size| {
      b.to_async(rt).iter(|| {
        let reactor = reactor.clone();

        async move {
          join_all((0..*batch_size).map(|i| push_echo(reactor.clone(), i))).await;
        }
      })
    },
  );
}
