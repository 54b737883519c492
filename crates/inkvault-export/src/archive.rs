// SPDX-License-Identifier: AGPL-3.0-or-later
//! Zip archive assembly shared by concurrent document exports
//!
//! Documents claim every path they will write before adding files, and a
//! document's files are staged together, so the archive never holds part of
//! a document. The zip itself is written once in [`ArchiveBuilder::finish`].

use crate::error::{ExportError, Result};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Default)]
struct ArchiveState {
    claimed: HashSet<String>,
    written: HashSet<String>,
    entries: Vec<(String, Vec<u8>)>,
}

/// In-memory archive behind a mutex
#[derive(Default)]
pub struct ArchiveBuilder {
    state: Mutex<ArchiveState>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ArchiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `dir/{stem}{suffix}` for every suffix at once.
    ///
    /// When any of those paths is taken, ` (2)`, ` (3)`... is appended to the
    /// stem until all of them are free. Returns the stem that was claimed.
    pub fn claim(&self, dir: &str, stem: &str, suffixes: &[&str]) -> String {
        let mut state = self.state();
        let mut candidate = stem.to_string();
        let mut n = 1;
        loop {
            let paths: Vec<String> = suffixes
                .iter()
                .map(|suffix| join_path(dir, &format!("{candidate}{suffix}")))
                .collect();
            if paths.iter().all(|p| !state.claimed.contains(p)) {
                state.claimed.extend(paths);
                return candidate;
            }
            n += 1;
            candidate = format!("{stem} ({n})");
        }
    }

    /// Stage a group of files; none are added if any path was already written
    pub fn add_files(&self, files: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut state = self.state();
        let mut seen = HashSet::new();
        for (path, _) in &files {
            if state.written.contains(path) || !seen.insert(path.as_str()) {
                return Err(ExportError::DuplicateEntry(path.clone()));
            }
        }
        for (path, content) in files {
            state.written.insert(path.clone());
            state.entries.push((path, content));
        }
        Ok(())
    }

    pub fn add_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.add_files(vec![(path.to_string(), content.to_vec())])
    }

    /// Paths staged so far, in staging order
    pub fn entries(&self) -> Vec<String> {
        self.state()
            .entries
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Write every staged file into a deflated zip
    pub fn finish(self) -> Result<Vec<u8>> {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in &state.entries {
            writer.start_file(path.as_str(), options)?;
            writer.write_all(content)?;
        }
        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_claim_dedupes_per_directory() {
        let archive = ArchiveBuilder::new();
        assert_eq!(archive.claim("work", "plan", &[".md"]), "plan");
        assert_eq!(archive.claim("work", "plan", &[".md"]), "plan (2)");
        assert_eq!(archive.claim("work", "plan", &[".md"]), "plan (3)");
        assert_eq!(archive.claim("", "plan", &[".md"]), "plan");
    }

    #[test]
    fn test_claim_covers_every_suffix() {
        let archive = ArchiveBuilder::new();
        assert_eq!(archive.claim("", "a", &[".json", ".meta.json"]), "a");
        // "a.meta" + ".json" is the sidecar path claimed above
        assert_eq!(archive.claim("", "a.meta", &[".json", ".meta.json"]), "a.meta (2)");
        // a different format under the same stem is still free
        assert_eq!(archive.claim("", "a", &[".md"]), "a");
    }

    #[test]
    fn test_written_archive_reads_back() {
        let archive = ArchiveBuilder::new();
        archive.add_file("a/b.md", b"# Hi").unwrap();
        archive.add_file("SUMMARY.md", b"done").unwrap();
        assert_eq!(archive.entries(), vec!["a/b.md", "SUMMARY.md"]);

        let bytes = archive.finish().unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 2);
        let mut content = String::new();
        zip.by_name("a/b.md").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "# Hi");
    }

    #[test]
    fn test_duplicate_path_rejects_whole_group() {
        let archive = ArchiveBuilder::new();
        archive.add_file("x.md", b"1").unwrap();
        let result = archive.add_files(vec![
            ("y.md".to_string(), b"2".to_vec()),
            ("x.md".to_string(), b"3".to_vec()),
        ]);
        assert!(matches!(result, Err(ExportError::DuplicateEntry(path)) if path == "x.md"));
        assert_eq!(archive.entries(), vec!["x.md"]);
    }
}
