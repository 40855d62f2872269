//! KIP: a small virtual machine and assembler, featuring:
//! - a lexer and two-pass preprocessor (imports, labels)
//! - a sparse, disjoint memory map over buffers or host callbacks
//! - an instruction dispatcher covering the full KIP opcode set

pub mod argument;
pub mod context;
pub mod engine;
pub mod error;
pub mod fault;
pub mod instruction;
pub mod lexer;
pub mod logging;
pub mod memory;
pub mod numeric;
pub mod opcode;
pub mod result_log;
pub mod token;

use std::fs;
use std::io;
use std::path::Path;

/// Reads a `.kip` source file into its lines. Backs both the CLI's top-level
/// program load and [`context::build`]'s import resolution.
pub fn load_file(path: &Path) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents.lines().map(str::to_string).collect())
}
