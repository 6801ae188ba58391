//! Utility functions for the command-line client

pub mod file;
pub mod terminal;
