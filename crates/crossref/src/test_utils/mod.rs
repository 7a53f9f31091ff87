// test_utils: helpers shared by unit tests, integration tests and benchmarks.

pub mod fixture_corpus;
