mod common;
mod failure_tests;
