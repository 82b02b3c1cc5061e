/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Document and component source loading.
//!
//! Sources come from either a filesystem folder or an embedded
//! [`include_dir`] bundle. Component lookup tries a fixed candidate list
//! derived from the tag name: the name as written, lowercased, and
//! kebab-cased, each across the supported template extensions.

use std::path::{Path, PathBuf};

use include_dir::Dir;

use crate::error::{Error, Result};

const COMPONENT_EXTENSIONS: &[&str] = &[".html", ".jinja", ".j2"];

/// Loads documents and component sources from a folder or embedded bundle.
#[derive(Debug, Clone)]
pub(crate) struct SourceLoader {
    folder: PathBuf,
    bundle: Option<&'static Dir<'static>>,
}

impl SourceLoader {
    pub(crate) fn new(folder: impl Into<PathBuf>, bundle: Option<&'static Dir<'static>>) -> Self {
        Self {
            folder: folder.into(),
            bundle,
        }
    }

    /// Read a document by path, relative to the folder or bundle root.
    pub(crate) fn read_document(&self, path: &str) -> Result<String> {
        if let Some(bundle) = self.bundle {
            let file = bundle.get_file(path).ok_or_else(|| Error::Io {
                path: path.to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
            return file
                .contents_utf8()
                .map(str::to_owned)
                .ok_or_else(|| Error::InvalidUtf8 {
                    path: path.to_owned(),
                });
        }
        let full = self.folder.join(path);
        read_file(&full)
    }

    /// Locate and read a component's source by tag name.
    ///
    /// Returns the source text and the path it resolved to, for error
    /// reporting. Every candidate tried is recorded so a lookup failure
    /// names the full search.
    pub(crate) fn read_component(&self, name: &str) -> Result<(String, String)> {
        let mut attempts = Vec::new();
        for candidate in component_file_candidates(name) {
            if let Some(bundle) = self.bundle {
                for path in bundle_paths(&self.folder, &candidate) {
                    if let Some(file) = bundle.get_file(&path) {
                        let text = file.contents_utf8().map(str::to_owned).ok_or_else(|| {
                            Error::InvalidUtf8 { path: path.clone() }
                        })?;
                        return Ok((text, path));
                    }
                    attempts.push(path);
                }
            } else {
                let full = self.folder.join(&candidate);
                if full.is_file() {
                    let text = read_file(&full)?;
                    return Ok((text, full.to_string_lossy().into_owned()));
                }
                attempts.push(full.to_string_lossy().into_owned());
            }
        }
        Err(Error::ComponentNotFound {
            name: name.to_owned(),
            attempts,
        })
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_string_lossy().into_owned(),
        source,
    })
}

/// Bundle lookups try the folder-qualified path first, then the bare
/// candidate, since embedded trees are often rooted at the folder already.
fn bundle_paths(folder: &Path, candidate: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let joined = folder.join(candidate).to_string_lossy().into_owned();
    if joined != candidate {
        paths.push(joined);
    }
    paths.push(candidate.to_owned());
    paths
}

/// Filename candidates for a component tag, in resolution order.
fn component_file_candidates(name: &str) -> Vec<String> {
    let mut stems = vec![name.to_owned()];
    let lower = name.to_lowercase();
    if !stems.contains(&lower) {
        stems.push(lower);
    }
    let kebab = to_kebab_case(name);
    if !stems.contains(&kebab) {
        stems.push(kebab);
    }
    let mut candidates = Vec::with_capacity(stems.len() * COMPONENT_EXTENSIONS.len());
    for stem in &stems {
        for ext in COMPONENT_EXTENSIONS {
            candidates.push(format!("{stem}{ext}"));
        }
    }
    candidates
}

/// `UserCard` becomes `user-card`; existing separators are preserved.
pub(crate) fn to_kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_kebab_case() {
        assert_eq!(to_kebab_case("UserCard"), "user-card");
        assert_eq!(to_kebab_case("Card"), "card");
        assert_eq!(to_kebab_case("NavBarItem"), "nav-bar-item");
    }

    #[test]
    fn test_candidate_order() {
        let candidates = component_file_candidates("UserCard");
        assert_eq!(candidates[0], "UserCard.html");
        assert!(candidates.contains(&"usercard.html".to_owned()));
        assert!(candidates.contains(&"user-card.jinja".to_owned()));
    }

    #[test]
    fn test_single_word_candidates_deduped() {
        let candidates = component_file_candidates("Card");
        // "card" serves as both the lowercase and kebab stem.
        assert_eq!(candidates.len(), 6);
    }

    #[test]
    fn test_resolves_kebab_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("user-card.html"), "<div></div>").unwrap();
        let loader = SourceLoader::new(dir.path(), None);
        let (text, origin) = loader.read_component("UserCard").unwrap();
        assert_eq!(text, "<div></div>");
        assert!(origin.ends_with("user-card.html"));
    }

    #[test]
    fn test_not_found_lists_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SourceLoader::new(dir.path(), None);
        let err = loader.read_component("Ghost").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("component Ghost not found"), "{msg}");
        assert!(msg.contains("Ghost.html"), "{msg}");
        assert!(msg.contains("ghost.j2"), "{msg}");
    }
}
