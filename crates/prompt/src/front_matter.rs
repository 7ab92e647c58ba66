//! Front-matter parsing.
//!
//! A document may open with a YAML block delimited by `---` lines:
//!
//! ```text
//! ---
//! name: security-hardening
//! model: opus
//! ---
//! # Security Hardening
//! ```
//!
//! Without the opening delimiter the whole input is body.

use crate::graph::scan_declared_flags;
use crate::types::{Document, Metadata};
use conductor_core::{AppError, AppResult};
use std::collections::BTreeSet;

const DELIMITER: &str = "---";
const ALT_CLOSER: &str = "...";

/// Split a document into metadata and body.
pub fn parse_front_matter(text: &str) -> AppResult<(Metadata, String)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut lines = text.split_inclusive('\n');
    let opening = match lines.next() {
        Some(line) if trim_eol(line) == DELIMITER => line,
        _ => return Ok((Metadata::default(), text.to_string())),
    };

    let mut offset = opening.len();
    let mut yaml = String::new();
    let mut closed = false;

    for line in lines {
        offset += line.len();
        let bare = trim_eol(line);
        if bare == DELIMITER || bare == ALT_CLOSER {
            closed = true;
            break;
        }
        yaml.push_str(line);
    }

    if !closed {
        return Err(AppError::MalformedMetadata(
            "unterminated front-matter block: missing closing '---'".to_string(),
        ));
    }

    let metadata = parse_metadata_yaml(&yaml)?;
    let body = text[offset..].to_string();

    Ok((metadata, body))
}

fn parse_metadata_yaml(yaml: &str) -> AppResult<Metadata> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::default());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| AppError::MalformedMetadata(format!("invalid YAML: {}", e)))?;

    match value {
        serde_yaml::Value::Null => Ok(Metadata::default()),
        serde_yaml::Value::Mapping(_) => serde_yaml::from_value(value)
            .map_err(|e| AppError::MalformedMetadata(format!("invalid field: {}", e))),
        _ => Err(AppError::MalformedMetadata(
            "front matter must be a key-value mapping".to_string(),
        )),
    }
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r']).trim_end()
}

impl Document {
    /// Parse raw document text.
    ///
    /// Declared flags are the union of front-matter `flags` and the flags listed
    /// in the body's parameter/options sections.
    pub fn parse(text: &str) -> AppResult<Self> {
        let (metadata, body) = parse_front_matter(text)?;

        let mut declared_flags: BTreeSet<String> = metadata
            .flags
            .iter()
            .map(|f| f.trim_start_matches('-').to_string())
            .filter(|f| !f.is_empty())
            .collect();
        declared_flags.extend(scan_declared_flags(&body));

        Ok(Self {
            source: None,
            metadata,
            body,
            declared_flags,
        })
    }
}
