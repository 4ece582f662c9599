//! Per-tree module indices.
//!
//! An index is recomputed from scratch whenever its tree is reparsed, so it
//! can never drift out of sync with the syntax. It records the module
//! header, the exposing set, and every top-level binding together with the
//! spans a definition query needs: the whole declaration, the name node
//! inside it, the preceding type annotation, and the preceding doc comment.

use ecow::EcoString;
use tree_sitter as ts;

use crate::{
    cst::{self, kind},
    span::Span,
};

/// The module name synthesized for files without a module declaration.
pub const DEFAULT_MODULE_NAME: &str = "Main";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum BindingKind {
    Value,
    TypeAlias,
    UnionType,
    UnionConstructor,
    Port,
    Operator,
}

#[derive(Debug, Clone)]
pub struct TopLevelBinding {
    pub name: EcoString,
    pub kind: BindingKind,
    /// Span of the whole declaration.
    pub declaration: Span,
    /// Span of the name node inside the declaration.
    pub name_node: Span,
    /// Span of the type annotation (for ports, the port signature itself).
    pub annotation: Option<Span>,
    /// Span of the `{-| ... -}` comment preceding the declaration.
    pub documentation: Option<Span>,
    /// For constructors, the name of the union type they belong to.
    pub parent_type: Option<EcoString>,
}

/// What a module or import exposes.
#[derive(Debug, Clone)]
pub enum ExposingSet {
    /// The wildcard form `exposing (..)`.
    All,
    Explicit(Box<[ExposedItem]>),
}

#[derive(Debug, Clone)]
pub struct ExposedItem {
    pub name: EcoString,
    pub kind: ExposedKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExposedKind {
    Value,
    Operator,
    Type { constructors: Option<ExposedConstructors> },
}

#[derive(Debug, Clone)]
pub enum ExposedConstructors {
    /// The aggregate form `T(..)`.
    All,
    Named(Box<[EcoString]>),
}

#[derive(Debug, Clone)]
pub struct ModuleIndex {
    pub module_name: EcoString,
    /// Span of the module declaration, absent for headerless files.
    pub module_declaration: Option<Span>,
    /// Span of the `exposing (...)` list in the module declaration.
    pub exposing_list: Option<Span>,
    pub exposing: ExposingSet,
    pub bindings: Box<[TopLevelBinding]>,
}

impl ModuleIndex {
    pub fn of_tree(tree: &ts::Tree, source: &str) -> Self {
        let root = tree.root_node();

        let mut module_name = None;
        let mut module_declaration = None;
        let mut exposing_list = None;
        let mut exposing = None;
        let mut bindings = Vec::new();

        // doc comments and type annotations attach to the declaration that
        // follows them, so they ride along until it shows up
        let mut pending_doc: Option<Span> = None;
        let mut pending_annotation: Option<(EcoString, Span)> = None;

        for child in cst::named_children(&root) {
            match child.kind() {
                kind::MODULE_DECLARATION => {
                    module_declaration = Some(Span::of_node(&child));

                    if let Some(name) =
                        cst::child_of_kind(&child, kind::UPPER_CASE_QID)
                    {
                        module_name =
                            Some(EcoString::from(cst::text(&name, source)));
                    }

                    if let Some(list) =
                        cst::child_of_kind(&child, kind::EXPOSING_LIST)
                    {
                        exposing_list = Some(Span::of_node(&list));
                        exposing = Some(parse_exposing_list(&list, source));
                    }
                }

                kind::BLOCK_COMMENT => {
                    let text = cst::text(&child, source);
                    pending_doc = text
                        .starts_with(cst::DOC_COMMENT_PREFIX)
                        .then(|| Span::of_node(&child));
                }

                kind::TYPE_ANNOTATION => {
                    pending_annotation = cst::child_of_kind(
                        &child,
                        kind::LOWER_CASE_IDENTIFIER,
                    )
                    .map(|name| {
                        (
                            EcoString::from(cst::text(&name, source)),
                            Span::of_node(&child),
                        )
                    });
                }

                kind::VALUE_DECLARATION => {
                    let name_node = cst::child_of_kind(
                        &child,
                        kind::FUNCTION_DECLARATION_LEFT,
                    )
                    .and_then(|left| {
                        cst::child_of_kind(
                            &left,
                            kind::LOWER_CASE_IDENTIFIER,
                        )
                    });

                    if let Some(name_node) = name_node {
                        let name =
                            EcoString::from(cst::text(&name_node, source));
                        let annotation = pending_annotation
                            .take()
                            .filter(|(annotated, _)| *annotated == name)
                            .map(|(_, span)| span);

                        bindings.push(TopLevelBinding {
                            name,
                            kind: BindingKind::Value,
                            declaration: Span::of_node(&child),
                            name_node: Span::of_node(&name_node),
                            annotation,
                            documentation: pending_doc.take(),
                            parent_type: None,
                        });
                    }

                    pending_doc = None;
                    pending_annotation = None;
                }

                kind::TYPE_DECLARATION => {
                    let Some(name_node) = cst::child_of_kind(
                        &child,
                        kind::UPPER_CASE_IDENTIFIER,
                    ) else {
                        pending_doc = None;
                        continue;
                    };

                    let type_name =
                        EcoString::from(cst::text(&name_node, source));

                    bindings.push(TopLevelBinding {
                        name: type_name.clone(),
                        kind: BindingKind::UnionType,
                        declaration: Span::of_node(&child),
                        name_node: Span::of_node(&name_node),
                        annotation: None,
                        documentation: pending_doc.take(),
                        parent_type: None,
                    });

                    for variant in cst::named_children(&child)
                        .into_iter()
                        .filter(|node| node.kind() == kind::UNION_VARIANT)
                    {
                        let Some(variant_name) = cst::child_of_kind(
                            &variant,
                            kind::UPPER_CASE_IDENTIFIER,
                        ) else {
                            continue;
                        };

                        bindings.push(TopLevelBinding {
                            name: EcoString::from(cst::text(
                                &variant_name,
                                source,
                            )),
                            kind: BindingKind::UnionConstructor,
                            declaration: Span::of_node(&variant),
                            name_node: Span::of_node(&variant_name),
                            annotation: None,
                            documentation: None,
                            parent_type: Some(type_name.clone()),
                        });
                    }

                    pending_annotation = None;
                }

                kind::TYPE_ALIAS_DECLARATION => {
                    if let Some(name_node) = cst::child_of_kind(
                        &child,
                        kind::UPPER_CASE_IDENTIFIER,
                    ) {
                        bindings.push(TopLevelBinding {
                            name: EcoString::from(cst::text(
                                &name_node, source,
                            )),
                            kind: BindingKind::TypeAlias,
                            declaration: Span::of_node(&child),
                            name_node: Span::of_node(&name_node),
                            annotation: None,
                            documentation: pending_doc.take(),
                            parent_type: None,
                        });
                    }

                    pending_doc = None;
                    pending_annotation = None;
                }

                kind::PORT_ANNOTATION => {
                    if let Some(name_node) = cst::child_of_kind(
                        &child,
                        kind::LOWER_CASE_IDENTIFIER,
                    ) {
                        bindings.push(TopLevelBinding {
                            name: EcoString::from(cst::text(
                                &name_node, source,
                            )),
                            kind: BindingKind::Port,
                            declaration: Span::of_node(&child),
                            name_node: Span::of_node(&name_node),
                            annotation: Some(Span::of_node(&child)),
                            documentation: pending_doc.take(),
                            parent_type: None,
                        });
                    }

                    pending_doc = None;
                    pending_annotation = None;
                }

                kind::INFIX_DECLARATION => {
                    if let Some(name_node) = cst::child_of_kind(
                        &child,
                        kind::OPERATOR_IDENTIFIER,
                    ) {
                        bindings.push(TopLevelBinding {
                            name: EcoString::from(cst::text(
                                &name_node, source,
                            )),
                            kind: BindingKind::Operator,
                            declaration: Span::of_node(&child),
                            name_node: Span::of_node(&name_node),
                            annotation: None,
                            documentation: pending_doc.take(),
                            parent_type: None,
                        });
                    }

                    pending_doc = None;
                    pending_annotation = None;
                }

                // unrecognized subtrees (including ERROR nodes) detach any
                // pending trivia but are otherwise skipped
                _ => {
                    pending_doc = None;
                    pending_annotation = None;
                }
            }
        }

        ModuleIndex {
            module_name: module_name
                .unwrap_or_else(|| EcoString::from(DEFAULT_MODULE_NAME)),
            module_declaration,
            exposing_list,
            exposing: exposing.unwrap_or(ExposingSet::All),
            bindings: bindings.into_boxed_slice(),
        }
    }

    /// The binding a lowercase identifier in expression position can refer
    /// to: a value or a port.
    pub fn value_binding(&self, name: &str) -> Option<&TopLevelBinding> {
        self.bindings.iter().find(|binding| {
            binding.name == name
                && matches!(
                    binding.kind,
                    BindingKind::Value | BindingKind::Port
                )
        })
    }

    /// The binding an uppercase identifier in type position can refer to.
    pub fn type_binding(&self, name: &str) -> Option<&TopLevelBinding> {
        self.bindings.iter().find(|binding| {
            binding.name == name
                && matches!(
                    binding.kind,
                    BindingKind::TypeAlias | BindingKind::UnionType
                )
        })
    }

    /// The binding an uppercase identifier in expression or pattern
    /// position can refer to: a union constructor, or a record alias whose
    /// name doubles as a constructor function.
    pub fn constructor_binding(
        &self,
        name: &str,
    ) -> Option<&TopLevelBinding> {
        self.bindings.iter().find(|binding| {
            binding.name == name
                && matches!(
                    binding.kind,
                    BindingKind::UnionConstructor | BindingKind::TypeAlias
                )
        })
    }

    pub fn operator_binding(&self, name: &str) -> Option<&TopLevelBinding> {
        self.bindings.iter().find(|binding| {
            binding.name == name && binding.kind == BindingKind::Operator
        })
    }

    /// The constructors of the union type named `name`, in declaration
    /// order.
    pub fn constructors_of<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a TopLevelBinding> + 'a {
        self.bindings.iter().filter(move |binding| {
            binding.kind == BindingKind::UnionConstructor
                && binding.parent_type.as_ref().is_some_and(|t| t == name)
        })
    }

    /// Whether `binding` is visible to importers of this module.
    pub fn is_exposed(&self, binding: &TopLevelBinding) -> bool {
        let items = match &self.exposing {
            ExposingSet::All => return true,
            ExposingSet::Explicit(items) => items,
        };

        match binding.kind {
            BindingKind::Value | BindingKind::Port => items.iter().any(
                |item| {
                    matches!(item.kind, ExposedKind::Value)
                        && item.name == binding.name
                },
            ),
            BindingKind::Operator => items.iter().any(|item| {
                matches!(item.kind, ExposedKind::Operator)
                    && item.name == binding.name
            }),
            BindingKind::TypeAlias | BindingKind::UnionType => {
                items.iter().any(|item| {
                    matches!(item.kind, ExposedKind::Type { .. })
                        && item.name == binding.name
                })
            }
            BindingKind::UnionConstructor => {
                let Some(parent) = &binding.parent_type else {
                    return false;
                };

                items.iter().any(|item| {
                    let ExposedKind::Type {
                        constructors: Some(constructors),
                    } = &item.kind
                    else {
                        return false;
                    };

                    item.name == *parent
                        && match constructors {
                            ExposedConstructors::All => true,
                            ExposedConstructors::Named(names) => {
                                names.contains(&binding.name)
                            }
                        }
                })
            }
        }
    }

    /// Every binding visible to importers.
    pub fn exposed_bindings(
        &self,
    ) -> impl Iterator<Item = &TopLevelBinding> {
        self.bindings
            .iter()
            .filter(|binding| self.is_exposed(binding))
    }
}

/// Parses an `exposing (...)` list, shared between module declarations and
/// import clauses.
pub fn parse_exposing_list(
    list: &ts::Node,
    source: &str,
) -> ExposingSet {
    let children = cst::named_children(list);

    if children
        .iter()
        .any(|child| child.kind() == kind::DOUBLE_DOT)
    {
        return ExposingSet::All;
    }

    let mut items = Vec::new();

    for child in children {
        match child.kind() {
            kind::EXPOSED_VALUE => {
                items.push(ExposedItem {
                    name: EcoString::from(cst::text(&child, source)),
                    kind: ExposedKind::Value,
                    span: Span::of_node(&child),
                });
            }

            kind::EXPOSED_OPERATOR => {
                let name = cst::child_of_kind(
                    &child,
                    kind::OPERATOR_IDENTIFIER,
                )
                .map(|op| EcoString::from(cst::text(&op, source)))
                .unwrap_or_else(|| {
                    // strip the parentheses of the textual form
                    let text = cst::text(&child, source);
                    EcoString::from(
                        text.trim_start_matches('(').trim_end_matches(')'),
                    )
                });

                items.push(ExposedItem {
                    name,
                    kind: ExposedKind::Operator,
                    span: Span::of_node(&child),
                });
            }

            kind::EXPOSED_TYPE => {
                let Some(name) = cst::child_of_kind(
                    &child,
                    kind::UPPER_CASE_IDENTIFIER,
                ) else {
                    continue;
                };

                let constructors = cst::child_of_kind(
                    &child,
                    kind::EXPOSED_UNION_CONSTRUCTORS,
                )
                .map(|ctors| {
                    match cst::child_of_kind(&ctors, kind::DOUBLE_DOT) {
                        Some(_) => ExposedConstructors::All,
                        None => ExposedConstructors::Named(
                            cst::descendants(ctors, &mut |node| {
                                node.kind() == kind::UPPER_CASE_IDENTIFIER
                            })
                            .into_iter()
                            .map(|node| {
                                EcoString::from(cst::text(&node, source))
                            })
                            .collect(),
                        ),
                    }
                });

                items.push(ExposedItem {
                    name: EcoString::from(cst::text(&name, source)),
                    kind: ExposedKind::Type { constructors },
                    span: Span::of_node(&child),
                });
            }

            _ => {}
        }
    }

    ExposingSet::Explicit(items.into_boxed_slice())
}
