//! Alert handlers invoked by timers

pub mod action;
pub mod base;

pub use action::ActionHandler;
pub use base::{Handler, LogHandler};
