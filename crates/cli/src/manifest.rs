//! JSON manifests describing an audiobook to import
//!
//! ```json
//! {
//!   "title": "The Long Road",
//!   "author": "A. Writer",
//!   "files": [{ "path": "part1.mp3", "duration_seconds": 600.0 }],
//!   "chapters": [{ "file": 0, "start_ms": 0, "end_ms": 600000, "title": "Departure" }]
//! }
//! ```
//!
//! Relative file paths are resolved against the manifest's directory.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storystream_core::{Audiobook, Chapter, SourceFile, Validator};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub chapters: Vec<ManifestChapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestFile {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestChapter {
    /// Index into `files`
    pub file: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

impl Manifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Builds a validated audiobook, resolving relative paths against `base_dir`
    pub fn into_audiobook(self, base_dir: &Path) -> Result<Audiobook> {
        let files = self
            .files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                let path = if file.path.is_absolute() {
                    file.path
                } else {
                    base_dir.join(file.path)
                };
                SourceFile::new(index, path, file.duration_seconds)
            })
            .collect();

        let chapters = self
            .chapters
            .into_iter()
            .enumerate()
            .map(|(index, chapter)| {
                Chapter::new(index, chapter.file, chapter.start_ms, chapter.end_ms, chapter.title)
            })
            .collect();

        let mut book = Audiobook::new(self.title, files, chapters);
        book.author = self.author.filter(|a| !a.trim().is_empty());

        if let Err(errors) = book.validate() {
            bail!("Manifest describes an invalid audiobook:\n  {}", errors.join("\n  "));
        }

        Ok(book)
    }
}
