//! Unit tests for publish scheduling and the task lifecycle.

mod support;
