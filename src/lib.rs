pub mod batch;
pub mod config;
pub mod destruct;
mod error;
pub mod formula;
pub mod sls;
pub mod solver;
pub mod star;
pub mod statistic;
pub mod tracer;
pub mod verify;

pub use error::{Error, Result};
