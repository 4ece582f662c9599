//! Import clauses and the binding environments they induce.
//!
//! The clause list of a tree is purely syntactic and is extracted eagerly
//! when the tree is (re)parsed. The *resolved* form — which local names an
//! import actually brings into scope — depends on the exposing sets of
//! other modules, so it is computed on demand against the current forest
//! and never cached across trees.
//!
//! The resolver never fabricates a binding for a name an import does not
//! expose: an import of a module that is missing from the forest, or an
//! `exposing` entry the source module does not actually export, yields an
//! unresolved import rather than a guess.

use std::{collections::HashMap, path::PathBuf};

use ecow::EcoString;
use tree_sitter as ts;

use crate::{
    cst::{self, kind},
    forest::{Forest, TreeContainer},
    index::{
        parse_exposing_list, BindingKind, ExposedConstructors, ExposedKind,
        ExposingSet, ModuleIndex,
    },
    span::{Span, Spanned},
};

/// The syntactic form of one `import` statement.
#[derive(Debug, Clone)]
pub struct ImportClause {
    pub module_name: EcoString,
    pub module_name_node: Span,
    pub alias: Option<Spanned<EcoString>>,
    pub exposing: Option<Spanned<ExposingSet>>,
    /// Span of the whole clause.
    pub span: Span,
}

impl ImportClause {
    /// The qualifier this import makes available: its alias if present,
    /// otherwise the full dotted module name. Aliasing *replaces* the
    /// module name as a qualifier; it does not add a second one.
    pub fn qualifier(&self) -> &EcoString {
        match &self.alias {
            Some(alias) => &alias.item,
            None => &self.module_name,
        }
    }

    /// Extracts every import clause of `tree` in document order.
    pub fn of_tree(tree: &ts::Tree, source: &str) -> Box<[ImportClause]> {
        cst::named_children(&tree.root_node())
            .into_iter()
            .filter(|node| node.kind() == kind::IMPORT_CLAUSE)
            .filter_map(|node| Self::of_node(&node, source))
            .collect()
    }

    fn of_node(node: &ts::Node, source: &str) -> Option<ImportClause> {
        let name = cst::child_of_kind(node, kind::UPPER_CASE_QID)?;

        let alias = cst::child_of_kind(node, kind::AS_CLAUSE)
            .and_then(|clause| {
                cst::child_of_kind(&clause, kind::UPPER_CASE_IDENTIFIER)
            })
            .map(|ident| {
                Span::of_node(&ident)
                    .with(EcoString::from(cst::text(&ident, source)))
            });

        let exposing = cst::child_of_kind(node, kind::EXPOSING_LIST).map(
            |list| {
                Span::of_node(&list).with(parse_exposing_list(&list, source))
            },
        );

        Some(ImportClause {
            module_name: EcoString::from(cst::text(&name, source)),
            module_name_node: Span::of_node(&name),
            alias,
            exposing,
            span: Span::of_node(node),
        })
    }
}

/// Where an unqualified local name imported into a module actually lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedBinding {
    pub module: EcoString,
    pub name: EcoString,
    pub kind: BindingKind,
}

/// An import clause resolved against the forest.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub module_name: EcoString,
    pub alias: Option<EcoString>,
    /// The file backing the imported module, absent when the module is
    /// missing from the forest; such an import is *unresolved* and exposes
    /// nothing.
    pub uri: Option<PathBuf>,
    /// Local unqualified name → origin, for names this import exposes.
    pub exposed: HashMap<EcoString, ExposedBinding>,
    /// Span of the originating clause; absent for the implicit prelude.
    pub clause: Option<Span>,
}

impl ResolvedImport {
    pub fn qualifier(&self) -> &EcoString {
        match &self.alias {
            Some(alias) => alias,
            None => &self.module_name,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.uri.is_some()
    }

    pub fn is_implicit(&self) -> bool {
        self.clause.is_none()
    }
}

/// Resolves the imports of `container` against `forest`, explicit clauses
/// first and the implicit prelude after them (so lookup order doubles as
/// shadowing order).
pub fn resolve_imports(
    forest: &Forest,
    container: &TreeContainer,
) -> Vec<ResolvedImport> {
    let clauses = container.import_clauses();
    let mut resolved = Vec::with_capacity(clauses.len() + PRELUDE.len());

    for clause in clauses {
        resolved.push(resolve_clause(forest, clause));
    }

    let own_name = &container.index().module_name;
    for prelude in PRELUDE {
        // a module never implicitly imports itself, and an explicit import
        // of a prelude module replaces the implicit one entirely
        if *own_name == prelude.module {
            continue;
        }
        if clauses
            .iter()
            .any(|clause| clause.module_name == prelude.module)
        {
            continue;
        }

        resolved.push(resolve_prelude(forest, prelude));
    }

    resolved
}

fn resolve_clause(forest: &Forest, clause: &ImportClause) -> ResolvedImport {
    let source = forest.by_module(&clause.module_name);
    let mut exposed = HashMap::new();

    if let (Some(source), Some(exposing)) = (source, &clause.exposing) {
        expand_exposing(
            source.index(),
            &exposing.item,
            &clause.module_name,
            &mut exposed,
        );
    }

    ResolvedImport {
        module_name: clause.module_name.clone(),
        alias: clause.alias.as_ref().map(|alias| alias.item.clone()),
        uri: source.map(|container| container.uri().to_path_buf()),
        exposed,
        clause: Some(clause.span),
    }
}

fn expand_exposing(
    index: &ModuleIndex,
    set: &ExposingSet,
    module: &EcoString,
    out: &mut HashMap<EcoString, ExposedBinding>,
) {
    let mut insert = |name: &EcoString, kind: BindingKind| {
        out.entry(name.clone()).or_insert_with(|| ExposedBinding {
            module: module.clone(),
            name: name.clone(),
            kind,
        });
    };

    match set {
        // `exposing (..)` on an import brings in everything the module
        // itself exposes, and nothing more
        ExposingSet::All => {
            for binding in index.exposed_bindings() {
                insert(&binding.name, binding.kind);
            }
        }

        ExposingSet::Explicit(items) => {
            for item in items.iter() {
                match &item.kind {
                    ExposedKind::Value => {
                        if let Some(binding) = index
                            .value_binding(&item.name)
                            .filter(|binding| index.is_exposed(binding))
                        {
                            insert(&binding.name, binding.kind);
                        }
                    }

                    ExposedKind::Operator => {
                        if let Some(binding) = index
                            .operator_binding(&item.name)
                            .filter(|binding| index.is_exposed(binding))
                        {
                            insert(&binding.name, binding.kind);
                        }
                    }

                    ExposedKind::Type { constructors } => {
                        if let Some(binding) = index
                            .type_binding(&item.name)
                            .filter(|binding| index.is_exposed(binding))
                        {
                            insert(&binding.name, binding.kind);
                        }

                        match constructors {
                            None => {}
                            Some(ExposedConstructors::All) => {
                                for ctor in index
                                    .constructors_of(&item.name)
                                    .filter(|c| index.is_exposed(c))
                                {
                                    insert(&ctor.name, ctor.kind);
                                }
                            }
                            Some(ExposedConstructors::Named(names)) => {
                                for ctor in index
                                    .constructors_of(&item.name)
                                    .filter(|c| names.contains(&c.name))
                                    .filter(|c| index.is_exposed(c))
                                {
                                    insert(&ctor.name, ctor.kind);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

// The implicit default imports every module receives, per the language's
// prelude. Names that have no source definition anywhere (`List` itself,
// for instance) simply never resolve, which is the correct degenerate case.

struct PreludeImport {
    module: &'static str,
    alias: Option<&'static str>,
    exposing: PreludeExposing,
}

enum PreludeExposing {
    Nothing,
    All,
    Named(&'static [PreludeItem]),
}

enum PreludeItem {
    Type(&'static str),
    TypeWithConstructors(&'static str),
    Operator(&'static str),
}

const PRELUDE: &[PreludeImport] = &[
    PreludeImport {
        module: "Basics",
        alias: None,
        exposing: PreludeExposing::All,
    },
    PreludeImport {
        module: "List",
        alias: None,
        exposing: PreludeExposing::Named(&[
            PreludeItem::Type("List"),
            PreludeItem::Operator("::"),
        ]),
    },
    PreludeImport {
        module: "Maybe",
        alias: None,
        exposing: PreludeExposing::Named(&[
            PreludeItem::TypeWithConstructors("Maybe"),
        ]),
    },
    PreludeImport {
        module: "Result",
        alias: None,
        exposing: PreludeExposing::Named(&[
            PreludeItem::TypeWithConstructors("Result"),
        ]),
    },
    PreludeImport {
        module: "String",
        alias: None,
        exposing: PreludeExposing::Named(&[PreludeItem::Type("String")]),
    },
    PreludeImport {
        module: "Char",
        alias: None,
        exposing: PreludeExposing::Named(&[PreludeItem::Type("Char")]),
    },
    PreludeImport {
        module: "Tuple",
        alias: None,
        exposing: PreludeExposing::Nothing,
    },
    PreludeImport {
        module: "Debug",
        alias: None,
        exposing: PreludeExposing::Nothing,
    },
    PreludeImport {
        module: "Platform",
        alias: None,
        exposing: PreludeExposing::Named(&[PreludeItem::Type("Program")]),
    },
    PreludeImport {
        module: "Platform.Cmd",
        alias: Some("Cmd"),
        exposing: PreludeExposing::Named(&[PreludeItem::Type("Cmd")]),
    },
    PreludeImport {
        module: "Platform.Sub",
        alias: Some("Sub"),
        exposing: PreludeExposing::Named(&[PreludeItem::Type("Sub")]),
    },
];

fn resolve_prelude(
    forest: &Forest,
    prelude: &PreludeImport,
) -> ResolvedImport {
    let module = EcoString::from(prelude.module);
    let source = forest.by_module(&module);
    let mut exposed = HashMap::new();

    if let Some(source) = source {
        let index = source.index();
        match &prelude.exposing {
            PreludeExposing::Nothing => {}
            PreludeExposing::All => {
                for binding in index.exposed_bindings() {
                    exposed.insert(
                        binding.name.clone(),
                        ExposedBinding {
                            module: module.clone(),
                            name: binding.name.clone(),
                            kind: binding.kind,
                        },
                    );
                }
            }
            PreludeExposing::Named(items) => {
                for item in items.iter() {
                    let bindings: Vec<_> = match item {
                        PreludeItem::Type(name) => {
                            index.type_binding(name).into_iter().collect()
                        }
                        PreludeItem::TypeWithConstructors(name) => index
                            .type_binding(name)
                            .into_iter()
                            .chain(index.constructors_of(name))
                            .collect(),
                        PreludeItem::Operator(name) => {
                            index.operator_binding(name).into_iter().collect()
                        }
                    };

                    for binding in bindings
                        .into_iter()
                        .filter(|binding| index.is_exposed(binding))
                    {
                        exposed.insert(
                            binding.name.clone(),
                            ExposedBinding {
                                module: module.clone(),
                                name: binding.name.clone(),
                                kind: binding.kind,
                            },
                        );
                    }
                }
            }
        }
    }

    ResolvedImport {
        module_name: module,
        alias: prelude.alias.map(EcoString::from),
        uri: source.map(|container| container.uri().to_path_buf()),
        exposed,
        clause: None,
    }
}

#[cfg(test)]
mod tests {
    use crate::cst::Parser;

    use super::*;

    fn clauses_of(source: &str) -> Box<[ImportClause]> {
        let mut parser = Parser::new();
        let tree = parser.parse(source);
        ImportClause::of_tree(&tree, source)
    }

    #[test]
    fn extracts_aliases_and_exposing_lists() {
        let source = "\
module B exposing (..)

import Api.Widget as Widget exposing (Widget(..), render)
import Html
import Json.Decode exposing (..)
";

        let clauses = clauses_of(source);
        assert_eq!(clauses.len(), 3);

        let widget = &clauses[0];
        assert_eq!(widget.module_name, "Api.Widget");
        assert_eq!(widget.qualifier(), "Widget");
        assert!(matches!(
            widget.exposing.as_ref().map(|e| &e.item),
            Some(ExposingSet::Explicit(items)) if items.len() == 2
        ));

        let html = &clauses[1];
        assert_eq!(html.module_name, "Html");
        assert_eq!(html.qualifier(), "Html");
        assert!(html.exposing.is_none());

        let decode = &clauses[2];
        assert!(matches!(
            decode.exposing.as_ref().map(|e| &e.item),
            Some(ExposingSet::All)
        ));
    }
}
