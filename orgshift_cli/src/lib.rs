//! orgshift CLI: argument surface and command wiring.

pub mod cli;
pub mod commands;
