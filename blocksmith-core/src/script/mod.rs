//! The instruction script language: tokenize, parse, execute.
//!
//! A script is a flat list of instructions driving the pipeline
//! (read → scale → save/load → generate). Scripts can include other scripts
//! with textual template substitution; included instructions are spliced
//! into the running queue right after the including instruction.

pub mod parse;
pub mod runtime;
pub mod token;
