#![cfg_attr(docsrs, feature(doc_cfg))]
//! Coalesce individually submitted items into batches, dispatch each batch to a processing function
//! once a count, delay or size threshold is crossed (or on demand), and resolve every item through
//! its own future.
//!
//! ```ignore
//! use batch_accumulator::{Accumulator, BatchOutput, Options};
//!
//! let accumulator = Accumulator::new(
//!   |keys: Vec<u64>| async move {
//!     let rows = fetch_rows(&keys).await?;
//!     Ok(rows.into_iter().map(Ok).collect::<BatchOutput<_, _>>())
//!   },
//!   Options::default().with_count(100).with_delay(Duration::from_millis(2)),
//! )?;
//!
//! let row = accumulator.submit(42)?.await?;
//! ```

mod accumulator;
mod batch;
pub mod error;
mod helpers;
pub mod options;
mod process;
pub mod task;

pub use accumulator::Accumulator;
pub use error::{ConfigError, ItemError, OversizeError};
pub use options::Options;
pub use process::{BatchOutput, Process};
pub use task::{Flush, Pending};
