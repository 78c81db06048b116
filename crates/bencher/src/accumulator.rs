use std::{
  convert::Infallible,
  time::{Duration, Instant},
};

use batch_accumulator::{Accumulator, BatchOutput, Options};
use criterion::{measurement::WallTime, BenchmarkGroup, BenchmarkId};
use futures::future::join_all;
use tokio::runtime::Runtime;

async fn echo(items: Vec<u64>) -> Result<BatchOutput<u64, Infallible>, Infallible> {
  Ok(BatchOutput::values(items))
}

pub fn bench_tasks(rt: &Runtime, bench: &mut BenchmarkGroup<WallTime>) {
  let immediate = Accumulator::new(echo, Options::default().with_count(1)).unwrap();

  bench.bench_function("submit", |bencher| {
    bencher.to_async(rt).iter(|| {
      let accumulator = immediate.clone();
      async move { accumulator.submit(0).unwrap().await.unwrap() }
    });
  });

  let stamped = Accumulator::new(
    |items: Vec<()>| async move {
      let batched_at = Some(Instant::now());
      Ok::<_, Infallible>(BatchOutput::<Option<Instant>, Infallible>::values(
        items.into_iter().map(|_| batched_at),
      ))
    },
    Options::default(),
  )
  .unwrap();

  bench.bench_function("receive value", |bencher| {
    bencher.to_async(rt).iter_custom(|iters| {
      let accumulator = stamped.clone();

      async move {
        let mut total = Duration::from_secs(0);

        for _i in 0..iters {
          let pending = accumulator.submit(()).unwrap();
          accumulator.release();
          let batched_at = pending.await.unwrap().unwrap();
          total = total.saturating_add(batched_at.elapsed());
        }

        total
      }
    });
  });
}

pub fn bench_batching(rt: &Runtime, bench: &mut BenchmarkGroup<WallTime>, batch_size: u64) {
  let by_count = Accumulator::new(
    echo,
    Options::default().with_count(batch_size as i64),
  )
  .unwrap();

  bench.bench_with_input(
    BenchmarkId::new("Accumulator::count", batch_size),
    &batch_size,
    |b, batch_size| {
      b.to_async(rt).iter(|| {
        let accumulator = by_count.clone();

        async move {
          join_all((0..*batch_size).map(|i| accumulator.submit(i).unwrap())).await;
        }
      })
    },
  );

  let manual = Accumulator::new(echo, Options::default()).unwrap();

  bench.bench_with_input(
    BenchmarkId::new("Accumulator::flush", batch_size),
    &batch_size,
    |b, batch_size| {
      b.to_async(rt).iter(|| {
        let accumulator = manual.clone();

        async move {
          let pending: Vec<_> = (0..*batch_size)
            .map(|i| accumulator.submit(i).unwrap())
            .collect();

          accumulator.flush().await;
          join_all(pending).await;
        }
      })
    },
  );
}
