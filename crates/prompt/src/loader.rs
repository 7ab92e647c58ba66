//! Document loader for markdown workflow, command and agent files.

use crate::types::Document;
use conductor_core::{AppError, AppResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

const DOCUMENT_EXTENSION: &str = "md";

/// Short listing entry for a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    /// Path relative to its document directory, without extension
    pub id: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Load and parse a document from a file.
///
/// # Example
/// ```no_run
/// use conductor_prompt::load_document;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let document = load_document(Path::new(".conductor/workflows/full-stack-feature.md"))?;
/// println!("Loaded: {}", document.display_name());
/// # Ok(())
/// # }
/// ```
pub fn load_document(path: &Path) -> AppResult<Document> {
    tracing::debug!("Loading document from: {:?}", path);

    if !path.is_file() {
        return Err(AppError::Prompt(format!(
            "Document file not found: {:?}",
            path
        )));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Prompt(format!("Failed to read document {:?}: {}", path, e))
    })?;

    let mut document = Document::parse(&contents)?;
    document.source = Some(path.to_path_buf());

    tracing::info!(
        "Loaded document: {} ({} declared flag(s))",
        document.display_name(),
        document.declared_flags.len()
    );

    Ok(document)
}

/// Resolve a document reference to a file path.
///
/// `reference` is either a path to an existing file, or an id looked up as
/// `<dir>/<id>.md` in each of `dirs` (relative dirs are joined to the
/// workspace). The first match wins.
pub fn find_document(workspace: &Path, dirs: &[PathBuf], reference: &str) -> AppResult<PathBuf> {
    let direct = PathBuf::from(reference);
    let direct = if direct.is_absolute() {
        direct
    } else {
        workspace.join(direct)
    };
    if direct.is_file() {
        return Ok(direct);
    }

    let id = reference
        .strip_suffix(".md")
        .unwrap_or(reference)
        .trim_matches('/');

    for dir in dirs {
        let candidate = resolve_dir(workspace, dir).join(format!("{}.{}", id, DOCUMENT_EXTENSION));
        tracing::trace!("Trying {:?}", candidate);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(AppError::Prompt(format!(
        "Document '{}' not found in {} search path(s)",
        reference,
        dirs.len()
    )))
}

/// List the documents available in `dirs`, sorted by id.
///
/// Documents with malformed front matter are still listed, without a name or
/// description.
pub fn list_documents(workspace: &Path, dirs: &[PathBuf]) -> AppResult<Vec<DocumentSummary>> {
    let mut summaries: Vec<DocumentSummary> = Vec::new();

    for dir in dirs {
        let root = resolve_dir(workspace, dir);
        if !root.is_dir() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&root)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|s| s.to_str()) != Some(DOCUMENT_EXTENSION)
            {
                continue;
            }

            let Some(id) = document_id(&root, path) else {
                continue;
            };
            if summaries.iter().any(|s| s.id == id) {
                tracing::debug!("Skipping shadowed document {:?}", path);
                continue;
            }

            let (name, description) = match std::fs::read_to_string(path)
                .map_err(AppError::from)
                .and_then(|text| crate::front_matter::parse_front_matter(&text))
            {
                Ok((metadata, _)) => (metadata.name, metadata.description),
                Err(e) => {
                    tracing::warn!("Unreadable document {:?}: {}", path, e);
                    (None, None)
                }
            };

            summaries.push(DocumentSummary {
                id,
                path: path.to_path_buf(),
                name,
                description,
            });
        }
    }

    summaries.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(summaries)
}

fn resolve_dir(workspace: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        workspace.join(dir)
    }
}

fn document_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_doc(dir: &Path, relative: &str, content: &str) -> PathBuf {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn dirs() -> Vec<PathBuf> {
        vec![
            PathBuf::from(".conductor/workflows"),
            PathBuf::from(".conductor/commands"),
        ]
    }

    #[test]
    fn test_load_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_doc(
            temp_dir.path(),
            "review.md",
            "---\nname: review\nflags: [--quick]\n---\nReview $ARGUMENTS\n",
        );

        let document = load_document(&path).unwrap();
        assert_eq!(document.display_name(), "review");
        assert_eq!(document.source.as_deref(), Some(path.as_path()));
        assert!(document.declared_flags.contains("quick"));
    }

    #[test]
    fn test_load_missing_document() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_document(&temp_dir.path().join("missing.md"));
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_load_malformed_front_matter() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_doc(temp_dir.path(), "bad.md", "---\nname: [unclosed\n---\nBody\n");
        let result = load_document(&path);
        assert!(matches!(result, Err(AppError::MalformedMetadata(_))));
    }

    #[test]
    fn test_find_document_by_id() {
        let temp_dir = TempDir::new().unwrap();
        write_doc(temp_dir.path(), ".conductor/commands/tdd-cycle.md", "Body");

        let found = find_document(temp_dir.path(), &dirs(), "tdd-cycle").unwrap();
        assert!(found.ends_with(".conductor/commands/tdd-cycle.md"));
    }

    #[test]
    fn test_find_document_prefers_earlier_dir() {
        let temp_dir = TempDir::new().unwrap();
        write_doc(temp_dir.path(), ".conductor/workflows/deploy.md", "A");
        write_doc(temp_dir.path(), ".conductor/commands/deploy.md", "B");

        let found = find_document(temp_dir.path(), &dirs(), "deploy.md").unwrap();
        assert!(found.ends_with(".conductor/workflows/deploy.md"));
    }

    #[test]
    fn test_find_document_by_path() {
        let temp_dir = TempDir::new().unwrap();
        write_doc(temp_dir.path(), "docs/custom.md", "Body");

        let found = find_document(temp_dir.path(), &dirs(), "docs/custom.md").unwrap();
        assert_eq!(found, temp_dir.path().join("docs/custom.md"));
    }

    #[test]
    fn test_find_document_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_document(temp_dir.path(), &dirs(), "nope").is_err());
    }

    #[test]
    fn test_list_documents() {
        let temp_dir = TempDir::new().unwrap();
        write_doc(
            temp_dir.path(),
            ".conductor/workflows/full-stack.md",
            "---\nname: full-stack\ndescription: Build features\n---\nBody",
        );
        write_doc(temp_dir.path(), ".conductor/commands/tools/lint.md", "No metadata");
        write_doc(temp_dir.path(), ".conductor/commands/broken.md", "---\nname: x\n");
        write_doc(temp_dir.path(), ".conductor/commands/notes.txt", "ignored");

        let docs = list_documents(temp_dir.path(), &dirs()).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["broken", "full-stack", "tools/lint"]);
        assert_eq!(docs[1].description.as_deref(), Some("Build features"));
        assert_eq!(docs[0].name, None);
    }

    #[test]
    fn test_list_documents_without_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let docs = list_documents(temp_dir.path(), &dirs()).unwrap();
        assert!(docs.is_empty());
    }
}
