mod common;

mod build_tests;
mod concurrency_tests;
mod failure_tests;
mod incremental_tests;
