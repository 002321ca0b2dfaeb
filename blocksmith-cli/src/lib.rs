//! Blocksmith CLI library.

pub mod cli;
pub mod logging;
