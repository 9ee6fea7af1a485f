//! Test suites for the collection daemon.

mod support;
