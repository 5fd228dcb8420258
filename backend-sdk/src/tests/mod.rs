//! Tests for the backend SDK
//!
//! Adapter tests run against WireMock servers standing in for each backend.

pub mod servicenow_mock_tests;
