#![forbid(unsafe_code)]

pub mod api;
pub mod catalog;
pub mod error;
pub mod model;
pub mod recalc;
pub mod time;

pub use error::Error;
pub use time::Clock;
