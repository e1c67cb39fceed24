//! Application core — session orchestration, zero direct I/O.
//!
//! The recorder's business rules live here and in [`crate::fsm`]: the
//! setup sequence, the per-poll orchestration of the state machine and
//! the phase-2 SPI transfer task.  All interaction with the board happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
pub mod transfer;
