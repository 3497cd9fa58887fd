//! Mock servers for integration testing.
//!
//! Simulates the Lyrion Music Server JSON-RPC interface, allowing full
//! integration testing without real hardware.

pub mod lms;

pub use lms::MockLmsServer;
