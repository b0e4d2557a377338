//! Unit tests for project locks and job leases.

mod support;
