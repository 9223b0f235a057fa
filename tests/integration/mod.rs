//! Integration tests for the restore scheduler

mod coalescing;
mod mutual_exclusion;
mod restore_now;
pub mod test_utils;
