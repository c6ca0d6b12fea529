//! Integration tests module
//!
//! End-to-end tests for the edgepulse adapter, including:
//! - Session lifecycle across every component
//! - Status monitoring, warnings and automatic quality adaptation
//! - Edge node health tracking and selection
//! - Error handling against a mocked REST API

pub mod adapter_test;
pub mod edge_test;
pub mod error_scenarios;
pub mod fixtures;
