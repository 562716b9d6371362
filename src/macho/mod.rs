//! Mach-O file format handling.
//!
//! This module provides types for decoding the header and load commands of
//! 64-bit Mach-O files and for encoding the records the synthesizer emits.

mod constants;
mod context;
mod reader;
mod structs;
mod walker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use constants::*;
pub use context::*;
pub use reader::*;
pub use structs::*;
pub use walker::*;
