//! Delimited fact files: one tuple per line, one field per column

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::datalog::{IoDirective, Tuple};
use crate::error::{HarnessError, Result};
use crate::storage::Relation;

/// Resolved location and format of one relation's data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactFile {
    pub path: PathBuf,
    pub delimiter: String,
}

impl FactFile {
    /// Resolve a directive against the fact or output directory
    pub fn resolve(dir: &Path, directive: &IoDirective) -> Self {
        FactFile {
            path: dir.join(directive.filename()),
            delimiter: directive.delimiter(),
        }
    }
}

/// Read every tuple of `file` typed by `relation`'s columns.
///
/// Fails on a missing/unreadable file, a wrong column count or a
/// non-numeric `number` field; nothing is returned on failure. Fields are
/// unescaped as written by [`write_relation`].
pub fn read_facts(file: &FactFile, relation: &Relation) -> Result<Vec<Tuple>> {
    let content = fs::read_to_string(&file.path)
        .map_err(|e| HarnessError::input_io(&file.path, format!("cannot read {}", relation.name()), e))?;

    let arity = relation.arity();
    let mut tuples = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        // A nullary relation holds at most the empty tuple, one empty line
        if arity == 0 {
            if !line.is_empty() {
                return Err(HarnessError::input_load(
                    &file.path,
                    format!("line {}: {} expects 0 columns", line_no + 1, relation.name()),
                ));
            }
            tuples.push(Vec::new());
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let fields = split_fields(line, &file.delimiter);
        if fields.len() != arity {
            return Err(HarnessError::input_load(
                &file.path,
                format!(
                    "line {}: {} expects {} columns, found {}",
                    line_no + 1,
                    relation.name(),
                    arity,
                    fields.len()
                ),
            ));
        }

        let tuple = fields
            .iter()
            .zip(relation.column_types())
            .map(|(raw, ty)| {
                ty.parse_value(raw).ok_or_else(|| {
                    HarnessError::input_load(
                        &file.path,
                        format!("line {}: cannot parse {:?} as {}", line_no + 1, raw, ty.name()),
                    )
                })
            })
            .collect::<Result<Tuple>>()?;
        tuples.push(tuple);
    }

    Ok(tuples)
}

/// Write `relation` to `file`, replacing any previous content.
///
/// Backslashes, line breaks, tabs and occurrences of the delimiter inside a
/// field are backslash-escaped so [`read_facts`] reads the same tuples back.
pub fn write_relation(file: &FactFile, relation: &Relation) -> Result<()> {
    let write_err =
        |e: std::io::Error| HarnessError::output_io(&file.path, format!("cannot write {}", relation.name()), e);

    let handle = File::create(&file.path).map_err(write_err)?;
    let mut writer = BufWriter::new(handle);

    for tuple in relation.iter() {
        let line = tuple
            .iter()
            .map(|v| escape_field(&v.to_string(), &file.delimiter))
            .collect::<Vec<_>>()
            .join(&file.delimiter);
        writeln!(writer, "{}", line).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    tracing::debug!("Wrote {} tuples of {} to {:?}", relation.len(), relation.name(), file.path);
    Ok(())
}

fn escape_field(field: &str, delimiter: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for (offset, c) in field.char_indices() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ if !delimiter.is_empty() && field[offset..].starts_with(delimiter) => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Split a line on `delimiter`, honouring the escapes of [`escape_field`]
fn split_fields(line: &str, delimiter: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.char_indices();

    while let Some((offset, c)) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => field.push('\n'),
                Some((_, 'r')) => field.push('\r'),
                Some((_, 't')) => field.push('\t'),
                Some((_, other)) => field.push(other),
                None => field.push('\\'),
            }
        } else if !delimiter.is_empty() && line[offset..].starts_with(delimiter) {
            fields.push(std::mem::take(&mut field));
            // Skip the rest of a multi-character delimiter
            for _ in 1..delimiter.chars().count() {
                chars.next();
            }
        } else {
            field.push(c);
        }
    }
    fields.push(field);
    fields
}
