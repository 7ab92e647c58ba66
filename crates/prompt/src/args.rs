//! Argument blob scanning.
//!
//! The caller hands over one free-form string, split into words the way a
//! shell would. Words of the form `--name` or `--name=value` whose name the
//! document declares become flags; every other word, unrecognized flags
//! included, stays in the catch-all `ARGUMENTS` value in its original order.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Flags recognized for one run, keyed by name without the leading `--`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeMap<String, String>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag. A bare `--name` is stored with the value "true".
    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.0
            .insert(name.into(), value.unwrap_or_else(|| "true".to_string()));
    }

    /// True if the flag was given, unless it was given as `=false`.
    pub fn is_set(&self, name: &str) -> bool {
        let name = name.trim_start_matches('-');
        self.0
            .get(name)
            .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.0.get(name.trim_start_matches('-')).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A scanned argument blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    /// Remaining words for `$ARGUMENTS`, joined by single spaces; `None`
    /// when nothing is left
    pub catch_all: Option<String>,

    /// Flags the document declares
    pub flags: FlagSet,
}

impl Arguments {
    /// Scan `blob` against the document's declared flags.
    ///
    /// Quotes group words (`"add login"` is one word). A blob with unbalanced
    /// quotes, e.g. a stray apostrophe, is split on whitespace instead.
    pub fn parse(blob: &str, declared_flags: &BTreeSet<String>) -> Self {
        let words = shell_words::split(blob).unwrap_or_else(|e| {
            tracing::debug!("Splitting arguments on whitespace ({}): {}", e, blob);
            blob.split_whitespace().map(str::to_string).collect()
        });
        Self::from_words(&words, declared_flags)
    }

    /// Build from words that are already split, e.g. the trailing words of a
    /// command line.
    pub fn from_words<S: AsRef<str>>(words: &[S], declared_flags: &BTreeSet<String>) -> Self {
        let mut flags = FlagSet::new();
        let mut kept: Vec<&str> = Vec::new();

        for word in words.iter().map(|w| w.as_ref()) {
            match split_flag(word) {
                Some((name, value)) if declared_flags.contains(name) => {
                    tracing::debug!("Recognized flag --{}", name);
                    flags.insert(name, value.map(str::to_string));
                }
                _ if word.trim().is_empty() => {}
                _ => kept.push(word),
            }
        }

        let catch_all = if kept.is_empty() {
            None
        } else {
            Some(kept.join(" "))
        };

        Self { catch_all, flags }
    }
}

fn split_flag(word: &str) -> Option<(&str, Option<&str>)> {
    let body = word.strip_prefix("--")?;
    if body.is_empty() {
        return None;
    }
    match body.split_once('=') {
        Some((name, value)) => Some((name, Some(value))),
        None => Some((body, None)),
    }
}
