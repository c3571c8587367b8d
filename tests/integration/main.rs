//! Integration tests for Sumi-Mirror
//!
//! These tests run complete mirror runs against wiremock servers into
//! temporary output roots.

mod mirror_tests;
