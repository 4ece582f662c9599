//! The programmatic surface a hosting editor-protocol layer talks to.
//!
//! A workspace owns its manifest, its solved dependency set, and its
//! forest; it is constructed once per project root and mutated only
//! through [`Workspace::apply_file_change`]. Queries never mutate. Hosts
//! that serve several roots simply hold several workspaces; nothing here
//! is shared between them.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    cancel::{CancelToken, Cancelled},
    forest::{Forest, TreeContainer},
    imports::{resolve_imports, ResolvedImport},
    package::{
        cache::PackageCache,
        metadata::{Manifest, ManifestLoadError},
        solver::{solve, SolveError, Solution},
        MANIFEST_FILE,
    },
    resolve::{self, Definition, Reference},
    source::{self, enumerate_sources, ScanError, SourceFile},
    span::Point,
};

/// A capability for reporting I/O trouble to the host.
///
/// The host decides what to do with the reports; the core only promises to
/// keep going. One sink is threaded into each workspace at load time, so
/// there is no ambient global to configure.
pub trait HostSink {
    fn io_error(&self, path: &Path, error: &io::Error);
}

/// The default sink: forward everything to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl HostSink for LogSink {
    fn io_error(&self, path: &Path, error: &io::Error) {
        log::warn!("io error on {}: {error}", path.display());
    }
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("project manifest at \"{}\" is unreadable or malformed", .path.display())]
    ProjectMisconfigured {
        path: Box<Path>,
        #[source]
        source: ManifestLoadError,
    },
    #[error(transparent)]
    SourceScan(#[from] ScanError),
}

/// A whole-file update delivered by the host.
#[derive(Debug, Clone)]
pub enum FileChange {
    Changed(Box<str>),
    Deleted,
}

pub struct Workspace {
    root: Box<Path>,
    manifest: Manifest,
    /// Absolute source directories of the project itself.
    project_dirs: Vec<PathBuf>,
    solution: Option<Solution>,
    solve_error: Option<SolveError>,
    forest: Forest,
    host: Box<dyn HostSink>,
}

impl Workspace {
    /// Reads the root manifest, runs the solver, and populates the forest
    /// with the project's files (writeable) and the files of every solved
    /// dependency (read-only).
    ///
    /// A manifest that cannot be read or parsed fails the load, as does a
    /// missing project source directory. A solver failure does not: the
    /// workspace then holds only the project files, and resolvers treat
    /// every dependency module as missing.
    pub fn load(
        root: impl Into<Box<Path>>,
        cache: &PackageCache,
        host: Box<dyn HostSink>,
    ) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILE);

        let manifest = Manifest::load(&manifest_path).map_err(|source| {
            WorkspaceError::ProjectMisconfigured {
                path: manifest_path.into_boxed_path(),
                source,
            }
        })?;

        let project_dirs: Vec<PathBuf> = manifest
            .source_directories()
            .into_iter()
            .map(|dir| root.join(dir))
            .collect();

        let (solution, solve_error) =
            match solve(cache, &manifest.solver_constraints()) {
                Ok(solution) => (Some(solution), None),
                Err(error) => {
                    log::warn!(
                        "dependency solving failed for {}: {error}",
                        root.display()
                    );
                    (None, Some(error))
                }
            };

        let mut workspace = Workspace {
            root,
            manifest,
            project_dirs,
            solution,
            solve_error,
            forest: Forest::new(),
            host,
        };

        workspace.ingest_project()?;
        workspace.ingest_dependencies(cache);

        Ok(workspace)
    }

    fn ingest_project(&mut self) -> Result<(), WorkspaceError> {
        for path in enumerate_sources(&self.project_dirs)? {
            self.ingest_file(path, true);
        }
        Ok(())
    }

    fn ingest_dependencies(&mut self, cache: &PackageCache) {
        let Some(solution) = &self.solution else {
            return;
        };

        let mut dependency_files = Vec::new();

        for (name, solved) in solution.iter() {
            let Some(dir) = cache.source_dir(name, &solved.version) else {
                continue;
            };

            // a half-downloaded release is a degraded view, not a failure
            match enumerate_sources(&[dir]) {
                Ok(files) => dependency_files.extend(files),
                Err(error) => log::warn!(
                    "skipping sources of {name} {}: {error}",
                    solved.version
                ),
            }
        }

        for path in dependency_files {
            self.ingest_file(path, false);
        }
    }

    fn ingest_file(&mut self, path: PathBuf, writeable: bool) {
        match SourceFile::read(path.clone().into_boxed_path()) {
            Ok(file) => {
                let (path, contents) = file.into_parts();
                self.forest.add_or_replace(
                    path.into_path_buf(),
                    contents,
                    writeable,
                );
            }
            Err(error) => self.host.io_error(&path, &error),
        }
    }

    /// Applies a whole-file change. The operation is idempotent: replaying
    /// the latest change for a file leaves the workspace unchanged.
    pub fn apply_file_change(
        &mut self,
        uri: impl Into<PathBuf>,
        change: FileChange,
    ) {
        let uri = uri.into();

        match change {
            FileChange::Changed(contents) => {
                if !source::is_elm_file(&uri) {
                    return;
                }

                let writeable = self.is_project_path(&uri);
                self.forest.add_or_replace(uri, contents, writeable);
            }
            FileChange::Deleted => self.forest.remove(&uri),
        }
    }

    fn is_project_path(&self, uri: &Path) -> bool {
        self.project_dirs.iter().any(|dir| uri.starts_with(dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The solved dependency assignment, absent when solving failed.
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Why solving failed, when it did.
    pub fn solve_error(&self) -> Option<&SolveError> {
        self.solve_error.as_ref()
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn tree(&self, uri: &Path) -> Option<&TreeContainer> {
        self.forest.get(uri)
    }

    pub fn find_definition(
        &self,
        uri: &Path,
        position: Point,
    ) -> Option<Definition> {
        resolve::find_definition(&self.forest, uri, position)
    }

    pub fn find_references(
        &self,
        definition: &Definition,
        cancel: &CancelToken,
    ) -> Result<Vec<Reference>, Cancelled> {
        resolve::find_references(&self.forest, definition, cancel)
    }

    /// The resolved imports of `uri`, explicit clauses first and the
    /// implicit prelude after them.
    pub fn imports(&self, uri: &Path) -> Vec<ResolvedImport> {
        self.forest
            .get(uri)
            .map(|container| resolve_imports(&self.forest, container))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("forest", &self.forest)
            .field("solved", &self.solution.is_some())
            .finish()
    }
}

/// A grammar-intrinsic type with no source definition anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyType {
    pub name: &'static str,
    pub markdown: &'static str,
}

/// The types the language defines by fiat rather than by source code.
/// Resolution can never find a defining node for them, so hover-style
/// features render this canned documentation instead.
pub fn empty_types() -> &'static [EmptyType] {
    const EMPTY_TYPES: &[EmptyType] = &[EmptyType {
        name: "List",
        markdown: "A list of values, like `[1, 2, 3]`. The `List` type \
                   itself is built into the compiler; its operations live \
                   in the `List` module.",
    }];

    EMPTY_TYPES
}
