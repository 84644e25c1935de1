pub mod counter_repository;

pub use counter_repository::{CounterRepository, DEFAULT_HISTORY_LIMIT};
