#![cfg_attr(not(test), no_std)]

mod fmt;

#[cfg(feature = "rp")]
pub mod board;
pub mod buttons;
pub mod config;
pub mod controller;
pub mod motor;
pub mod sensor;
pub mod storage;
#[cfg(test)]
mod testing;

pub use crate::config::Config;
pub use crate::controller::{ControllerState, MotionController};
pub use crate::fmt::Loggable;
