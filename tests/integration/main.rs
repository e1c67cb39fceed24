//! Integration test driver for `tests/integration/`.
//!
//! Every test drives the real sensor drivers and the recorder service
//! against simulated chips and in-memory storage on the host.

mod mock_hw;
mod recorder_tests;
