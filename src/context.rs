//! Two-phase preprocessor: splice `< file` imports (with cycle rejection),
//! then extract `> NAME [value]` label declarations, blanking each
//! declaration line so it is a no-op at execution time.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::argument::Argument;
use crate::error::Error;
use crate::lexer;
use crate::numeric;
use crate::token::TokenSpan;

/// The compile-time artifact of import and label resolution.
#[derive(Debug, Clone)]
pub struct Context {
    pub labels: HashMap<String, Argument>,
    pub import_base_folder: PathBuf,
}

/// The fully preprocessed program: the line list (with imports spliced in
/// and label declarations blanked) plus the resulting [`Context`] and the
/// initial program counter (the `START` label's value, or 0).
pub struct BuildResult {
    pub lines: Vec<String>,
    pub context: Context,
    pub initial_pc: u32,
}

/// Build a [`Context`] from raw source lines. `load_file` loads an imported
/// file's lines given its resolved path; in production this is backed by
/// [`crate::load_file`], and tests can substitute an in-memory stub.
pub fn build(
    source_lines: Vec<String>,
    import_base_folder: PathBuf,
    load_file: &dyn Fn(&Path) -> std::io::Result<Vec<String>>,
) -> Result<BuildResult, Error> {
    let lines = resolve_imports(source_lines, &import_base_folder, load_file)?;
    let (lines, labels) = resolve_labels(lines)?;
    let initial_pc = match labels.get("START") {
        Some(Argument::Data { value, .. }) => *value,
        _ => 0,
    };
    Ok(BuildResult { lines, context: Context { labels, import_base_folder }, initial_pc })
}

fn resolve_imports(
    mut lines: Vec<String>,
    base: &Path,
    load_file: &dyn Fn(&Path) -> std::io::Result<Vec<String>>,
) -> Result<Vec<String>, Error> {
    let mut imported: HashSet<PathBuf> = HashSet::new();
    let mut i = 0;
    loop {
        if i >= lines.len() {
            break;
        }
        let trimmed = lines[i].trim_start();
        let Some(rest) = trimmed.strip_prefix('<') else {
            i += 1;
            continue;
        };

        let filename = rest.trim();
        if filename.is_empty() {
            return Err(Error::MissingImportFilename { line_number: i + 1, line: lines[i].clone() });
        }

        let path = base.join(filename);
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !imported.insert(canonical) {
            return Err(Error::CyclicImport { path, line_number: i + 1, line: lines[i].clone() });
        }

        let imported_lines = load_file(&path)
            .map_err(|_| Error::ImportReadError { path: path.clone(), line_number: i + 1, line: lines[i].clone() })?;
        lines.splice(i..i + 1, imported_lines);
        i = 0; // Phase 1 restarts from the top after every splice.
    }
    Ok(lines)
}

struct LabelDecl {
    line_index: usize,
    remainder: String,
}

fn resolve_labels(mut lines: Vec<String>) -> Result<(Vec<String>, HashMap<String, Argument>), Error> {
    let mut decls: Vec<(String, LabelDecl)> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let stripped = lexer::strip_comment(line);
        let trimmed = stripped.trim_start();
        let Some(rest) = trimmed.strip_prefix('>') else { continue };
        let rest = rest.trim_start();

        let mut parts = rest.splitn(2, char::is_whitespace);
        let name_raw = parts.next().unwrap_or("");
        if name_raw.is_empty() {
            return Err(Error::EmptyLabelName { line_number: i + 1, line: line.clone() });
        }
        let name = uppercase_outside_quotes(name_raw);
        let value_raw = parts.next().unwrap_or("").trim();
        decls.push((name, LabelDecl { line_index: i, remainder: uppercase_outside_quotes(value_raw) }));
    }

    let decl_map: HashMap<String, &LabelDecl> = decls.iter().map(|(n, d)| (n.clone(), d)).collect();
    let mut resolved: HashMap<String, Argument> = HashMap::new();
    let mut in_progress: HashSet<String> = HashSet::new();

    for (name, _) in &decls {
        resolve_one(name, &decl_map, &mut resolved, &mut in_progress, &lines)?;
    }

    for (_, decl) in &decls {
        lines[decl.line_index] = String::new();
    }

    Ok((lines, resolved))
}

fn resolve_one(
    name: &str,
    decl_map: &HashMap<String, &LabelDecl>,
    resolved: &mut HashMap<String, Argument>,
    in_progress: &mut HashSet<String>,
    lines: &[String],
) -> Result<Argument, Error> {
    if let Some(value) = resolved.get(name) {
        return Ok(value.clone());
    }
    let decl = *decl_map.get(name).expect("label was gathered by the first label sub-pass");
    if !in_progress.insert(name.to_string()) {
        return Err(Error::CyclicLabelReference {
            label: name.to_string(),
            line_number: decl.line_index + 1,
            line: lines[decl.line_index].clone(),
        });
    }

    let value = if decl.remainder.is_empty() {
        Argument::Data { value: decl.line_index as u32 + 1, dereference_count: 0 }
    } else if decl.remainder.starts_with('"') {
        if decl.remainder.len() < 2 || !decl.remainder.ends_with('"') {
            return Err(Error::UnterminatedString {
                token_span: TokenSpan::new(0, decl.remainder.len()),
                line_number: decl.line_index + 1,
                line: lines[decl.line_index].clone(),
            });
        }
        Argument::String { text: decl.remainder[1..decl.remainder.len() - 1].as_bytes().to_vec() }
    } else if decl_map.contains_key(decl.remainder.as_str()) {
        resolve_one(&decl.remainder, decl_map, resolved, in_progress, lines)?
    } else {
        let value = numeric::parse(&decl.remainder).ok_or_else(|| Error::MalformedNumber {
            token: decl.remainder.clone(),
            token_span: TokenSpan::new(0, decl.remainder.len()),
            line_number: decl.line_index + 1,
            line: lines[decl.line_index].clone(),
        })?;
        Argument::Data { value, dereference_count: 0 }
    };

    in_progress.remove(name);
    resolved.insert(name.to_string(), value.clone());
    Ok(value)
}

fn uppercase_outside_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_quotes = false;
    for c in s.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
            out.push(c);
        } else if in_quotes {
            out.push(c);
        } else {
            out.extend(c.to_uppercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_imports(_: &Path) -> std::io::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn build_lines(lines: &[&str]) -> BuildResult {
        let owned = lines.iter().map(|s| s.to_string()).collect();
        build(owned, PathBuf::new(), &no_imports).unwrap()
    }

    #[test]
    fn label_without_value_defaults_to_its_own_one_based_line_index() {
        let result = build_lines(&["> LOOP", "STB 1 10", "JMP LOOP"]);
        assert_eq!(result.context.labels["LOOP"], Argument::Data { value: 1, dereference_count: 0 });
        assert_eq!(result.lines[0], "");
    }

    #[test]
    fn start_label_sets_the_initial_pc() {
        let result = build_lines(&["JMP SKIP", "> START 2", "HLT"]);
        assert_eq!(result.initial_pc, 2);
    }

    #[test]
    fn missing_start_label_defaults_pc_to_zero() {
        let result = build_lines(&["HLT"]);
        assert_eq!(result.initial_pc, 0);
    }

    #[test]
    fn label_can_alias_another_label_declared_later() {
        let result = build_lines(&["> A B", "> B 42"]);
        assert_eq!(result.context.labels["A"], Argument::Data { value: 42, dereference_count: 0 });
    }

    #[test]
    fn label_value_can_be_a_quoted_string() {
        let result = build_lines(&[r#"> GREETING "hi there""#]);
        assert_eq!(result.context.labels["GREETING"], Argument::String { text: b"hi there".to_vec() });
    }

    #[test]
    fn mutually_aliasing_labels_are_rejected() {
        let owned = vec!["> A B".to_string(), "> B A".to_string()];
        assert!(matches!(
            build(owned, PathBuf::new(), &no_imports),
            Err(Error::CyclicLabelReference { .. })
        ));
    }

    #[test]
    fn missing_import_filename_is_rejected() {
        let owned = vec!["<".to_string()];
        assert!(matches!(
            build(owned, PathBuf::new(), &no_imports),
            Err(Error::MissingImportFilename { .. })
        ));
    }

    #[test]
    fn self_importing_file_is_rejected_as_cyclic() {
        let base = PathBuf::new();
        let loader = move |_: &Path| -> std::io::Result<Vec<String>> { Ok(vec!["< self.kip".to_string()]) };
        let owned = vec!["< self.kip".to_string()];
        assert!(matches!(build(owned, base, &loader), Err(Error::CyclicImport { .. })));
    }
}
