//! Test utilities shared by the integration tests.
