//! Parses a single lexed line into an [`Instruction`], resolving label
//! references against a [`Context`].

use crate::argument::Argument;
use crate::context::Context;
use crate::error::Error;
use crate::lexer::{self, Token};
use crate::numeric;
use crate::opcode;

/// A fully parsed line: its opcode and resolved arguments. `opcode_id == 0`
/// marks a no-op (blank line, comment, or blanked-out label declaration).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub source_line: String,
    pub opcode_id: u8,
    pub args: Vec<Argument>,
}

/// Parse one source line into an [`Instruction`] given the context built so
/// far (used for label lookup).
pub fn parse_line(line: &str, line_number: usize, context: &Context) -> Result<Instruction, Error> {
    let lexed = lexer::lex(line);

    let mnemonic_token = match lexed.mnemonic {
        Some(token) => token,
        None => return Ok(Instruction { source_line: line.to_string(), opcode_id: 0, args: Vec::new() }),
    };

    let info = opcode::lookup(&mnemonic_token.text).ok_or_else(|| Error::UnknownOpcode {
        mnemonic: mnemonic_token.text.clone(),
        mnemonic_span: mnemonic_token.span,
        line_number,
        line: line.to_string(),
    })?;

    if lexed.arguments.len() != info.arity {
        return Err(Error::InvalidArgumentCount {
            mnemonic: info.mnemonic.to_string(),
            found: lexed.arguments.len(),
            expected: info.arity,
            line_number,
            line: line.to_string(),
        });
    }

    let mut args = Vec::with_capacity(lexed.arguments.len());
    for token in &lexed.arguments {
        args.push(parse_argument(token, line_number, line, context)?);
    }

    Ok(Instruction { source_line: line.to_string(), opcode_id: info.id, args })
}

fn parse_argument(token: &Token, line_number: usize, line: &str, context: &Context) -> Result<Argument, Error> {
    let mut rest = token.text.as_str();
    let mut dereference_count: u8 = 0;
    while let Some(stripped) = rest.strip_prefix('*') {
        dereference_count = dereference_count.saturating_add(1);
        rest = stripped;
    }

    if rest.starts_with('"') {
        if dereference_count > 0 {
            return Err(Error::DereferencedString { token_span: token.span, line_number, line: line.to_string() });
        }
        if rest.len() < 2 || !rest.ends_with('"') {
            return Err(Error::UnterminatedString { token_span: token.span, line_number, line: line.to_string() });
        }
        let inner = &rest[1..rest.len() - 1];
        return Ok(Argument::String { text: inner.as_bytes().to_vec() });
    }

    if let Some(label) = context.labels.get(rest) {
        if matches!(label, Argument::String { .. }) && dereference_count > 0 {
            return Err(Error::DereferencedString { token_span: token.span, line_number, line: line.to_string() });
        }
        return Ok(add_dereferences(label.clone(), dereference_count));
    }

    let value = numeric::parse(rest).ok_or_else(|| Error::MalformedNumber {
        token: token.text.clone(),
        token_span: token.span,
        line_number,
        line: line.to_string(),
    })?;
    Ok(Argument::Data { value, dereference_count })
}

fn add_dereferences(arg: Argument, extra: u8) -> Argument {
    match arg {
        Argument::Data { value, dereference_count } => {
            Argument::Data { value, dereference_count: dereference_count.saturating_add(extra) }
        }
        other => other,
    }
}
