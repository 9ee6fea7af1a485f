//! Behavioural test suites for section execution.

mod behaviour;
