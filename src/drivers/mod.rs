//! Board drivers: the push-button, the status LED sequencer, core-pinned
//! task spawning and the one-shot peripheral bring-up.

pub mod button;
pub mod hw_init;
pub mod led_patterns;
pub mod task_pin;
