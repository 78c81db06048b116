pub mod accumulator;
pub mod mpsc;
