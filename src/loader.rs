//! Document loading for the ingestion pipeline.
//!
//! Validation happens here, before any external call: the source directory
//! and every named file must exist, otherwise the job fails immediately.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::extract;
use crate::models::SourceDocument;

/// Load the named documents from `dir`.
///
/// Text formats are read as UTF-8; PDF/DOCX/XLSX go through [`extract`].
/// Fails on a missing directory, a missing file, or an extraction error.
pub fn load_documents(dir: &Path, names: &[String]) -> Result<Vec<SourceDocument>> {
    if !dir.is_dir() {
        bail!("document location does not exist: {}", dir.display());
    }

    let mut documents = Vec::with_capacity(names.len());
    for name in names {
        let path = dir.join(name);
        if !path.is_file() {
            bail!("document not found: {}", path.display());
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let text = if extract::is_binary_format(&extension) {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            extract::extract_text(&bytes, &extension)
                .with_context(|| format!("failed to extract {}", path.display()))?
        } else {
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?
        };

        documents.push(SourceDocument {
            name: name.clone(),
            path,
            text,
        });
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_directory_fails() {
        let err = load_documents(Path::new("/nonexistent/docs"), &["a.txt".to_string()])
            .unwrap_err()
            .to_string();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_documents(tmp.path(), &["ghost.md".to_string()])
            .unwrap_err()
            .to_string();
        assert!(err.contains("not found"));
    }

    #[test]
    fn loads_text_files_in_request_order() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.md"), "beta").unwrap();
        fs::write(tmp.path().join("a.txt"), "alpha").unwrap();

        let docs =
            load_documents(tmp.path(), &["b.md".to_string(), "a.txt".to_string()]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "b.md");
        assert_eq!(docs[0].text, "beta");
        assert_eq!(docs[1].text, "alpha");
    }

    #[test]
    fn corrupt_binary_document_fails() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("report.pdf"), "not a pdf").unwrap();
        assert!(load_documents(tmp.path(), &["report.pdf".to_string()]).is_err());
    }
}
