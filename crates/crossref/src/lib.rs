// lib.rs: library root of the reference indexing engine.
//
// The `crossref` binary (main.rs) is a thin argument dispatcher over `cli`;
// benches/ and tests/ use this crate directly.

pub mod cli;
pub mod perf;
pub mod reference;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
