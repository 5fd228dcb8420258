//! Scenario tests for the orchestration loop
//!
//! These drive full turns with a scripted model and in-process tool fakes,
//! plus one end-to-end run against a mocked ServiceNow instance.

pub mod servicenow_tool_tests;
