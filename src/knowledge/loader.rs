// src/knowledge/loader.rs — Load .md / .txt documents from directories

use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["md", "txt"];

/// Text of every `.md` / `.txt` file directly inside each directory, sorted
/// by path within a directory. Missing or unreadable directories and files
/// are skipped with a warning.
pub fn load_documents(dirs: &[String]) -> Vec<String> {
    let mut documents = Vec::new();
    for dir in dirs {
        let dir = Path::new(dir);
        let files = match list_documents(dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Skipping knowledge directory");
                continue;
            }
        };
        for path in files {
            match std::fs::read_to_string(&path) {
                Ok(text) => documents.push(text),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable document")
                }
            }
        }
    }
    tracing::debug!(documents = documents.len(), "Knowledge base loaded");
    documents
}

fn list_documents(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_document_extension(p))
        .collect();
    files.sort();
    Ok(files)
}

fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}
