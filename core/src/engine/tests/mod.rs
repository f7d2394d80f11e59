//! Tests for the queue state machine and task lifecycle

mod helpers;
mod lifecycle_tests;
mod timer_tests;
