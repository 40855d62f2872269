//! Compile-time errors: lexing, argument parsing, import and label resolution.
//!
//! Runtime faults (unmapped memory, divide-by-zero) are a different thing —
//! see [`crate::fault::Fault`] — and never surface as an [`Error`]; they are
//! folded into a failed [`crate::engine::KipResult`] instead.

use std::fmt;
use std::path::PathBuf;
use colored::Colorize;
use crate::token::TokenSpan;

/// An error that can occur while building a program's context or parsing a
/// single line into an instruction.
#[derive(Debug)]
pub enum Error {
    /// A mnemonic that isn't in the opcode catalogue.
    UnknownOpcode {
        mnemonic: String,
        mnemonic_span: TokenSpan,
        line_number: usize,
        line: String,
    },
    /// A numeric token that failed to parse under its selected radix.
    MalformedNumber {
        token: String,
        token_span: TokenSpan,
        line_number: usize,
        line: String,
    },
    /// A token that opens a quote but never closes it.
    UnterminatedString {
        token_span: TokenSpan,
        line_number: usize,
        line: String,
    },
    /// A `*` was applied to a string-valued argument or label.
    DereferencedString {
        token_span: TokenSpan,
        line_number: usize,
        line: String,
    },
    /// An opcode was given the wrong number of arguments.
    InvalidArgumentCount {
        mnemonic: String,
        found: usize,
        expected: usize,
        line_number: usize,
        line: String,
    },
    /// An import line (`< path`) had no filename.
    MissingImportFilename { line_number: usize, line: String },
    /// An import's target file could not be read.
    ImportReadError {
        path: PathBuf,
        line_number: usize,
        line: String,
    },
    /// The same file was imported twice, directly or transitively.
    CyclicImport {
        path: PathBuf,
        line_number: usize,
        line: String,
    },
    /// A label declaration (`> `) had no name.
    EmptyLabelName { line_number: usize, line: String },
    /// Two labels alias each other in a cycle (`> A B` / `> B A`).
    CyclicLabelReference {
        label: String,
        line_number: usize,
        line: String,
    },
}

impl std::error::Error for Error {}

fn underline_spans(line: &str, spans: Vec<&TokenSpan>) -> String {
    let mut underline = vec![' '; line.len()];
    for span in spans {
        for i in span.start()..span.end() {
            if i < underline.len() {
                underline[i] = '^';
            }
        }
    }
    underline.into_iter().collect()
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (message, line, line_number, spans): (String, Option<&String>, Option<&usize>, Vec<&TokenSpan>) = match self {
            Error::UnknownOpcode { mnemonic, mnemonic_span, line_number, line } => (
                format!("unknown opcode \"{}\" at line {}", mnemonic, line_number),
                Some(line), Some(line_number), vec![mnemonic_span],
            ),
            Error::MalformedNumber { token, token_span, line_number, line } => (
                format!("malformed numeric literal \"{}\" at line {}", token, line_number),
                Some(line), Some(line_number), vec![token_span],
            ),
            Error::UnterminatedString { token_span, line_number, line } => (
                format!("unterminated string literal at line {}", line_number),
                Some(line), Some(line_number), vec![token_span],
            ),
            Error::DereferencedString { token_span, line_number, line } => (
                format!("cannot dereference a string argument at line {}", line_number),
                Some(line), Some(line_number), vec![token_span],
            ),
            Error::InvalidArgumentCount { mnemonic, found, expected, line_number, line } => (
                format!(
                    "invalid argument count for \"{}\" at line {}: found {}, expected {}",
                    mnemonic, line_number, found, expected
                ),
                Some(line), Some(line_number), vec![],
            ),
            Error::MissingImportFilename { line_number, line } => (
                format!("missing filename in import at line {}", line_number),
                Some(line), Some(line_number), vec![],
            ),
            Error::ImportReadError { path, line_number, line } => (
                format!("failed to read imported file {} at line {}", path.display(), line_number),
                Some(line), Some(line_number), vec![],
            ),
            Error::CyclicImport { path, line_number, line } => (
                format!("cyclic import of {} at line {}", path.display(), line_number),
                Some(line), Some(line_number), vec![],
            ),
            Error::EmptyLabelName { line_number, line } => (
                format!("empty label name at line {}", line_number),
                Some(line), Some(line_number), vec![],
            ),
            Error::CyclicLabelReference { label, line_number, line } => (
                format!("label \"{}\" at line {} refers to itself through another label", label, line_number),
                Some(line), Some(line_number), vec![],
            ),
        };
        writeln!(f, "{}", message)?;
        if let (Some(line), Some(line_number)) = (line, line_number) {
            write!(f, "{}\t{}", line_number, line)?;
            if !spans.is_empty() {
                writeln!(f)?;
                write!(f, "\t{}", underline_spans(line, spans).green())?;
            }
        }
        Ok(())
    }
}
