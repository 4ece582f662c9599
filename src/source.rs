//! File wrapper types and source-directory enumeration.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use walkdir::WalkDir;

pub const ELM_FILE_EXTENSION: &str = "elm";

/// The build-artifact directory Elm tooling drops into project roots. It can
/// contain stale copies of source files, so scans must never descend into it.
const STUFF_DIR: &str = "elm-stuff";

#[derive(Clone)]
pub struct SourceFile {
    path: Box<Path>,
    contents: Box<str>,
}

impl SourceFile {
    pub fn read(path: impl Into<Box<Path>>) -> io::Result<Self> {
        let path = path.into();
        let contents = fs::read_to_string(&path)?.into_boxed_str();
        Ok(Self { path, contents })
    }

    pub fn new(
        path: impl Into<Box<Path>>,
        contents: impl Into<Box<str>>,
    ) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn into_parts(self) -> (Box<Path>, Box<str>) {
        (self.path, self.contents)
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let contents = format!(
            "... {{{:.3}KiB}}",
            (self.contents.as_bytes().len() as f64) / 1024f64
        );
        f.debug_struct("SourceFile")
            .field("path", &self.path)
            .field("contents", &contents)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("source directory \"{}\" does not exist or is not a directory", .0.display())]
    MissingSourceDir(Box<Path>),
}

/// Recursively enumerates the Elm files under each of `dirs`.
///
/// Hidden directories and `elm-stuff` are skipped. The result is sorted and
/// deduplicated, so overlapping source directories cannot produce the same
/// file twice and repeated scans of an unchanged tree are identical.
pub fn enumerate_sources(
    dirs: &[PathBuf],
) -> Result<Vec<PathBuf>, ScanError> {
    let mut paths = Vec::new();

    for dir in dirs {
        if !dir.is_dir() {
            return Err(ScanError::MissingSourceDir(
                dir.clone().into_boxed_path(),
            ));
        }

        let files = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| {
                !entry
                    .file_name()
                    .to_str()
                    .map(|name| name.starts_with('.') || name == STUFF_DIR)
                    .unwrap_or(false)
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    log::warn!("skipping unreadable directory entry: {error}");
                    None
                }
            })
            .filter(|entry| is_elm_file(entry.path()))
            .map(|entry| entry.into_path());

        paths.extend(files);
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

pub fn is_elm_file(path: &Path) -> bool {
    path.extension()
        .and_then(|os_str| os_str.to_str())
        .is_some_and(|ext| ext == ELM_FILE_EXTENSION)
}
