//! The forest of parsed trees, keyed by file path.
//!
//! The forest is the authoritative store for everything derived from
//! source text. Each entry owns its tree, the text the tree was parsed
//! from, and the two per-tree views (module index and import clauses) that
//! are recomputed wholesale on every mutation; the module-name secondary
//! index is likewise derived from the per-tree indices after each change,
//! so it cannot drift from the module declarations it summarizes.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use ecow::EcoString;
use tree_sitter as ts;

use crate::{
    cst::{self, Parser},
    imports::ImportClause,
    index::ModuleIndex,
    span::Span,
};

/// A parsed source file and its derived views.
pub struct TreeContainer {
    uri: PathBuf,
    source: Box<str>,
    tree: ts::Tree,
    writeable: bool,
    /// Bumped on every reparse; views derived from an older generation of
    /// this container are stale by definition.
    generation: u64,
    index: ModuleIndex,
    imports: Box<[ImportClause]>,
}

impl TreeContainer {
    pub fn uri(&self) -> &Path {
        &self.uri
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &ts::Tree {
        &self.tree
    }

    pub fn root(&self) -> ts::Node<'_> {
        self.tree.root_node()
    }

    /// Whether this tree belongs to the user's project (and may receive
    /// edits) rather than to a solved dependency.
    pub fn writeable(&self) -> bool {
        self.writeable
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> &ModuleIndex {
        &self.index
    }

    pub fn import_clauses(&self) -> &[ImportClause] {
        &self.imports
    }

    pub fn module_name(&self) -> &EcoString {
        &self.index.module_name
    }

    /// Recovers the node a span-valued view refers to.
    pub fn node_for_span(&self, span: Span) -> Option<ts::Node<'_>> {
        cst::node_for_span(self.root(), span)
    }

    /// The source text under `span`.
    pub fn text_of(&self, span: Span) -> &str {
        self.source.get(span.byte_range()).unwrap_or_default()
    }
}

impl std::fmt::Debug for TreeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeContainer")
            .field("uri", &self.uri)
            .field("module", &self.index.module_name)
            .field("writeable", &self.writeable)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Default)]
pub struct Forest {
    trees: HashMap<PathBuf, TreeContainer>,
    by_module: HashMap<EcoString, PathBuf>,
    parser: Parser,
    generation: u64,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `contents` and installs (or replaces) the container for
    /// `uri`, then rebuilds the module-name index.
    pub fn add_or_replace(
        &mut self,
        uri: impl Into<PathBuf>,
        contents: impl Into<Box<str>>,
        writeable: bool,
    ) {
        let uri = uri.into();
        let source = contents.into();
        let tree = self.parser.parse(&source);

        let index = ModuleIndex::of_tree(&tree, &source);
        let imports = ImportClause::of_tree(&tree, &source);

        self.generation += 1;
        let generation = self.generation;

        self.trees.insert(
            uri.clone(),
            TreeContainer {
                uri,
                source,
                tree,
                writeable,
                generation,
                index,
                imports,
            },
        );

        self.rebuild_module_index();
    }

    /// Removes the container for `uri`, if any.
    pub fn remove(&mut self, uri: &Path) {
        if self.trees.remove(uri).is_some() {
            self.generation += 1;
            self.rebuild_module_index();
        }
    }

    pub fn get(&self, uri: &Path) -> Option<&TreeContainer> {
        self.trees.get(uri)
    }

    pub fn by_module(&self, name: &str) -> Option<&TreeContainer> {
        let uri = self.by_module.get(name)?;
        self.trees.get(uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeContainer> {
        self.trees.values()
    }

    /// The writeable containers, i.e. the user's own project files.
    pub fn writeable(&self) -> impl Iterator<Item = &TreeContainer> {
        self.iter().filter(|container| container.writeable())
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Derives the module-name index from the per-tree indices.
    ///
    /// Collisions are resolved deterministically: a writeable tree beats a
    /// read-only one (the user's file shadows a dependency), and ties go to
    /// the lexicographically smallest path. Two writeable trees sharing a
    /// module name violate the forest invariant, so the loser is logged.
    fn rebuild_module_index(&mut self) {
        let mut entries: Vec<&TreeContainer> = self.trees.values().collect();
        entries.sort_by(|a, b| {
            b.writeable
                .cmp(&a.writeable)
                .then_with(|| a.uri.cmp(&b.uri))
        });

        let mut by_module: HashMap<EcoString, PathBuf> = HashMap::with_capacity(entries.len());

        for container in entries {
            let name = container.module_name().clone();

            if let Some(winner) = by_module.get(&name) {
                if container.writeable {
                    log::warn!(
                        "duplicate module {name}: {} shadowed by {}",
                        container.uri.display(),
                        winner.display(),
                    );
                }
                continue;
            }

            by_module.insert(name, container.uri.clone());
        }

        self.by_module = by_module;
    }
}

impl std::fmt::Debug for Forest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forest")
            .field("trees", &self.trees.len())
            .field("modules", &self.by_module.len())
            .field("generation", &self.generation)
            .finish()
    }
}
