//! End-to-end harness shared by the root integration tests and benches.

pub mod bench_support;
