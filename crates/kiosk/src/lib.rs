//! Kiosk launcher library: configuration resolution, the run loop and the
//! operator-facing presentation. `main.rs` only parses arguments and dispatches.

pub mod present;
pub mod run;
pub mod settings;
