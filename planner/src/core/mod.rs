//! Deterministic, pure logic for planning and execution.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! plans and results and return deterministic outputs suitable for tests.

pub mod budget;
pub mod confirmation;
pub mod order;
pub mod params;
pub mod types;
pub mod validate;
