//! Conversion of an object file into a minimal executable.
//!
//! # Pipeline
//!
//! 1. **Text Extraction** - Reads the `__text` section of the first segment
//! 2. **Synthesis** - Wraps the code in a fixed six-command executable layout
//! 3. **Writing** - Creates the output file from the assembled image

mod extract;
mod synth;
mod writer;

pub use extract::*;
pub use synth::*;
pub use writer::*;
