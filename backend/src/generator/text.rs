//! Holder name normalization and overlay-format substitution.
//!
//! The overlay format is the text drawn on each certificate, written with
//! `{Column}` placeholders that are filled from the roster row. Two names are
//! reserved: `{fname}` is the normalized holder name (a literal `{Name}` is
//! rewritten to it), and `{date}` is the job's display date when the roster has
//! no `date` column. `{{` and `}}` produce literal braces.

use crate::generator::roster::RosterRow;
use regex::Regex;
use thiserror::Error;

pub const FNAME_PLACEHOLDER: &str = "fname";
pub const DATE_PLACEHOLDER: &str = "date";
pub const NAME_COLUMN: &str = "Name";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("missing column '{0}' referenced by the overlay format")]
    MissingColumn(String),
    #[error("malformed overlay format: {0}")]
    Malformed(String),
}

/// Title-cases a holder name while respecting initials.
///
/// Words are split on whitespace and rejoined with single spaces. Inside a
/// word a character is uppercased when it is the first one or directly
/// follows a period; every other character is lowercased, so
/// `"j.r.r. tolkien"` becomes `"J.R.R. Tolkien"`.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(normalize_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev: Option<char> = None;
    for ch in word.chars() {
        if prev.is_none() || prev == Some('.') {
            // Multi-char mappings (`ß` -> `SS`) would be re-lowercased on a
            // second pass, so such characters stay as they are.
            let mut upper = ch.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(single), None) => out.push(single),
                _ => out.push(ch),
            }
        } else {
            out.extend(ch.to_lowercase());
        }
        prev = Some(ch);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed overlay format, compiled once per job and rendered per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFormat {
    segments: Vec<Segment>,
}

impl OverlayFormat {
    /// Parses `format`; an empty format renders the normalized name.
    pub fn parse(format: &str) -> Result<Self, FormatError> {
        if format.trim().is_empty() {
            return Ok(Self {
                segments: vec![Segment::Placeholder(FNAME_PLACEHOLDER.to_string())],
            });
        }

        let re = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]")
            .map_err(|e| FormatError::Malformed(e.to_string()))?;

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in re.captures_iter(format) {
            let Some(whole) = caps.get(0) else { continue };
            literal.push_str(&format[last..whole.start()]);
            last = whole.end();

            match whole.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                "{" | "}" => {
                    return Err(FormatError::Malformed(format!(
                        "unmatched '{}' at byte {}",
                        whole.as_str(),
                        whole.start()
                    )));
                }
                _ => {
                    let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                    if name.is_empty() {
                        return Err(FormatError::Malformed(format!(
                            "empty placeholder at byte {}",
                            whole.start()
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let name = if name == NAME_COLUMN { FNAME_PLACEHOLDER } else { name };
                    segments.push(Segment::Placeholder(name.to_string()));
                }
            }
        }

        literal.push_str(&format[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Placeholder names in order of appearance, after the `{Name}` rewrite.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes every placeholder for one roster row.
    pub fn render(&self, row: &RosterRow, fname: &str, date: &str) -> Result<String, FormatError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) if name == FNAME_PLACEHOLDER => out.push_str(fname),
                Segment::Placeholder(name) => match row.get(name) {
                    Some(value) => out.push_str(value),
                    None if name == DATE_PLACEHOLDER => out.push_str(date),
                    None => return Err(FormatError::MissingColumn(name.clone())),
                },
            }
        }
        Ok(out)
    }
}
