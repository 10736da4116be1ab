//! Utilities shared by the Tsubu server binary and its tests.

pub mod logger;
pub mod time;
