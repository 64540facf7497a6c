pub mod config;
pub mod ctl;
pub mod error;
pub mod routing;
pub mod topo;

pub use error::{Error, Result};

#[cfg(test)]
mod test;
