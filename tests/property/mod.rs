//! Property-based tests for request accumulation and queue coalescing

mod drain_window;
