//! Definition and reference resolution.
//!
//! Resolution starts from a cursor, classifies the identifier it lands on
//! by walking its parent chain, and then searches outward through the
//! scopes that can bind it: pattern binders, let declarations, file-scope
//! bindings, explicit imports, and the implicit prelude, in that order.
//! Because the walk follows the literal tree shape, whichever binder is
//! syntactically nearer always wins, which is exactly the shadowing rule.
//!
//! Reference search runs the same machinery in reverse: every occurrence
//! of the bare name is resolved back to its definition, and only the
//! occurrences that land on the queried definition are reported. All
//! results are span-valued views; they borrow nothing from the forest.

use std::path::{Path, PathBuf};

use ecow::EcoString;
use tree_sitter as ts;

use crate::{
    cancel::{CancelToken, Cancelled},
    cst::{self, kind},
    forest::{Forest, TreeContainer},
    imports::{resolve_imports, ResolvedImport},
    index::BindingKind,
    span::{Point, Span},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub uri: PathBuf,
    pub name: EcoString,
    pub kind: DefinitionKind,
    /// Span of the defining name node.
    pub name_node: Span,
    /// Span of the whole defining declaration; for pattern binders this is
    /// the binder itself.
    pub declaration: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    TopLevel(BindingKind),
    FunctionParameter,
    AnonymousFunctionParameter,
    CasePattern,
    LetBinding,
}

impl DefinitionKind {
    /// Whether the definition can be referenced from other files at all.
    fn is_top_level(self) -> bool {
        matches!(self, DefinitionKind::TopLevel(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub uri: PathBuf,
    pub node: Span,
    pub kind: ReferenceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Definition,
    Use,
    ExposingClauseEntry,
    ImportClauseEntry,
}

/// Finds the definition of the identifier under `position` in `uri`.
pub fn find_definition(
    forest: &Forest,
    uri: &Path,
    position: Point,
) -> Option<Definition> {
    let container = forest.get(uri)?;
    let node = cst::node_at(container.root(), position)?;
    let imports = resolve_imports(forest, container);
    resolve_node(forest, container, node, &imports)
}

/// Finds every reference to `def`: its defining occurrence, every use, and
/// the exposing- and import-list entries that re-export it. The token is
/// checked between files; results are sorted by `(uri, span)`.
pub fn find_references(
    forest: &Forest,
    def: &Definition,
    cancel: &CancelToken,
) -> Result<Vec<Reference>, Cancelled> {
    let mut references = Vec::new();

    let Some(defining) = forest.get(&def.uri) else {
        return Ok(references);
    };

    if !def.kind.is_top_level() {
        collect_local_references(forest, defining, def, &mut references);
        sort_references(&mut references);
        return Ok(references);
    }

    scan_container(forest, defining, def, &mut references);

    // an unexposed symbol has no external references, so the cross-file
    // search can stop before it starts
    let exposed = defining
        .index()
        .bindings
        .iter()
        .find(|binding| binding.name_node == def.name_node)
        .is_some_and(|binding| defining.index().is_exposed(binding));

    if exposed {
        for container in forest.writeable() {
            cancel.check()?;

            if container.uri() == def.uri {
                continue;
            }

            scan_container(forest, container, def, &mut references);
        }
    }

    sort_references(&mut references);
    Ok(references)
}

fn sort_references(references: &mut [Reference]) {
    references.sort_by(|a, b| {
        a.uri.cmp(&b.uri).then_with(|| a.node.cmp(&b.node))
    });
}

/// Resolves every same-name occurrence in `container` back to its
/// definition and records the ones that land on `def`.
fn scan_container(
    forest: &Forest,
    container: &TreeContainer,
    def: &Definition,
    out: &mut Vec<Reference>,
) {
    let occurrences = name_occurrences(
        container.root(),
        container.source(),
        &def.name,
    );
    if occurrences.is_empty() {
        return;
    }

    let imports = resolve_imports(forest, container);

    for occurrence in occurrences {
        let resolved =
            resolve_node(forest, container, occurrence, &imports);
        if resolved.as_ref() != Some(def) {
            continue;
        }

        out.push(Reference {
            uri: container.uri().to_path_buf(),
            node: Span::of_node(&occurrence),
            kind: classify_reference(container, &occurrence, def),
        });
    }
}

fn classify_reference(
    container: &TreeContainer,
    occurrence: &ts::Node,
    def: &Definition,
) -> ReferenceKind {
    if container.uri() == def.uri
        && Span::of_node(occurrence) == def.name_node
    {
        return ReferenceKind::Definition;
    }

    match cst::ancestor_of_kind(*occurrence, kind::EXPOSING_LIST)
        .and_then(|list| list.parent())
        .map(|owner| owner.kind())
    {
        Some(kind::IMPORT_CLAUSE) => ReferenceKind::ImportClauseEntry,
        Some(kind::MODULE_DECLARATION) => ReferenceKind::ExposingClauseEntry,
        _ => ReferenceKind::Use,
    }
}

/// References to a pattern- or let-bound definition, which are confined to
/// the subtree its scope spans.
fn collect_local_references(
    forest: &Forest,
    container: &TreeContainer,
    def: &Definition,
    out: &mut Vec<Reference>,
) {
    let Some(binder) = container.node_for_span(def.name_node) else {
        return;
    };

    let scope_kind = match def.kind {
        DefinitionKind::FunctionParameter => kind::VALUE_DECLARATION,
        DefinitionKind::AnonymousFunctionParameter => {
            kind::ANONYMOUS_FUNCTION_EXPR
        }
        DefinitionKind::CasePattern => kind::CASE_OF_BRANCH,
        DefinitionKind::LetBinding => kind::LET_IN_EXPR,
        DefinitionKind::TopLevel(_) => unreachable!(
            "local reference collection is only called for local kinds"
        ),
    };

    let Some(scope) = cst::ancestor_of_kind(binder, scope_kind) else {
        return;
    };

    let imports = resolve_imports(forest, container);

    for occurrence in
        name_occurrences(scope, container.source(), &def.name)
    {
        let resolved =
            resolve_node(forest, container, occurrence, &imports);
        if resolved.as_ref() != Some(def) {
            continue;
        }

        let span = Span::of_node(&occurrence);
        out.push(Reference {
            uri: container.uri().to_path_buf(),
            node: span,
            kind: match span == def.name_node {
                true => ReferenceKind::Definition,
                false => ReferenceKind::Use,
            },
        });
    }
}

/// The identifier leaves under `node` whose text is `name`. Pattern binders
/// are included even when the grammar flattens them into a single node.
fn name_occurrences<'t>(
    node: ts::Node<'t>,
    source: &str,
    name: &str,
) -> Vec<ts::Node<'t>> {
    cst::descendants(node, &mut |candidate| {
        let is_leaf_identifier = matches!(
            candidate.kind(),
            kind::LOWER_CASE_IDENTIFIER
                | kind::UPPER_CASE_IDENTIFIER
                | kind::OPERATOR_IDENTIFIER
        ) || (candidate.kind() == kind::LOWER_PATTERN
            && candidate.named_child_count() == 0);

        is_leaf_identifier && cst::text(candidate, source) == name
    })
}

// CLASSIFICATION

fn resolve_node(
    forest: &Forest,
    container: &TreeContainer,
    node: ts::Node,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    // a cursor exactly on a defining name is its own answer, regardless of
    // which declaration form introduced it
    if let Some(binding) = container
        .index()
        .bindings
        .iter()
        .find(|binding| binding.name_node == Span::of_node(&node))
    {
        return Some(top_level_definition(container, binding));
    }

    match node.kind() {
        kind::LOWER_CASE_IDENTIFIER => {
            resolve_lower(forest, container, node, imports)
        }
        kind::LOWER_PATTERN if node.named_child_count() == 0 => {
            Some(binder_definition(container, node))
        }
        kind::UPPER_CASE_IDENTIFIER => {
            resolve_upper(forest, container, node, imports)
        }
        kind::OPERATOR_IDENTIFIER => {
            resolve_operator(forest, container, node, imports)
        }
        _ => None,
    }
}

fn resolve_lower(
    forest: &Forest,
    container: &TreeContainer,
    node: ts::Node,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    let source = container.source();
    let name = cst::text(&node, source);
    let parent = node.parent()?;

    match parent.kind() {
        // a pattern binder is its own defining occurrence
        kind::LOWER_PATTERN => Some(binder_definition(container, parent)),

        // the name in `f x y = ...`; top-level names were already handled
        // by the index fast path, so this is a let declaration
        kind::FUNCTION_DECLARATION_LEFT => {
            let declaration = parent.parent()?;
            Some(Definition {
                uri: container.uri().to_path_buf(),
                name: EcoString::from(name),
                kind: DefinitionKind::LetBinding,
                name_node: Span::of_node(&node),
                declaration: Span::of_node(&declaration),
            })
        }

        // the name in `f : ...` refers to the value it annotates
        kind::TYPE_ANNOTATION => {
            resolve_value_in_scope(forest, container, node, name, imports)
        }

        kind::PORT_ANNOTATION => {
            let binding = container.index().value_binding(name)?;
            Some(top_level_definition(container, binding))
        }

        // `x` or `Mod.x` in an expression
        kind::VALUE_QID => {
            match qid_qualifier(&parent, &node, source) {
                Some(qualifier) => resolve_qualified(
                    forest,
                    &qualifier,
                    name,
                    Namespace::Value,
                    imports,
                ),
                None => resolve_value_in_scope(
                    forest, container, node, name, imports,
                ),
            }
        }

        // `exposing (x)` on a module declaration or an import
        kind::EXPOSED_VALUE => {
            resolve_exposing_entry(forest, container, node, Namespace::Value)
        }

        // the base record in `{ model | field = ... }`
        kind::RECORD_BASE_IDENTIFIER => {
            resolve_value_in_scope(forest, container, node, name, imports)
        }

        // record fields, accessor functions, and similar have no defining
        // node the resolver could point at
        _ => None,
    }
}

fn resolve_upper(
    forest: &Forest,
    container: &TreeContainer,
    node: ts::Node,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    let source = container.source();
    let name = cst::text(&node, source);
    let parent = node.parent()?;

    match parent.kind() {
        kind::UPPER_CASE_QID => {
            // non-final segments are module qualifiers, and module names
            // have no defining node in the forest's sense
            if next_qid_segment(&parent, &node).is_some() {
                return None;
            }

            match parent.parent().map(|owner| owner.kind()) {
                Some(kind::MODULE_DECLARATION)
                | Some(kind::IMPORT_CLAUSE) => None,
                _ => {
                    let namespace = upper_namespace(node);
                    match qid_qualifier(&parent, &node, source) {
                        Some(qualifier) => resolve_qualified(
                            forest, &qualifier, name, namespace, imports,
                        ),
                        None => resolve_unqualified_upper(
                            forest, container, name, namespace, imports,
                        ),
                    }
                }
            }
        }

        // the alias in `import Foo as F` introduces a qualifier, not a
        // resolvable binding
        kind::AS_CLAUSE => None,

        kind::EXPOSED_TYPE => {
            resolve_exposing_entry(forest, container, node, Namespace::Type)
        }

        kind::EXPOSED_UNION_CONSTRUCTORS
        | kind::EXPOSED_UNION_CONSTRUCTOR => resolve_exposing_entry(
            forest,
            container,
            node,
            Namespace::Constructor,
        ),

        _ => {
            // bare uppercase identifiers outside a qid still occur in
            // patterns and type expressions for single-segment names
            resolve_unqualified_upper(
                forest,
                container,
                name,
                upper_namespace(node),
                imports,
            )
        }
    }
}

fn resolve_operator(
    forest: &Forest,
    container: &TreeContainer,
    node: ts::Node,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    let source = container.source();
    let name = cst::text(&node, source);

    if let Some(parent) = node.parent() {
        if parent.kind() == kind::EXPOSED_OPERATOR {
            return resolve_exposing_entry(
                forest,
                container,
                node,
                Namespace::Operator,
            );
        }
    }

    // operators cannot be qualified, so resolution is the module's own
    // infix declarations followed by the imports that expose one
    if let Some(binding) = container.index().operator_binding(name) {
        return Some(top_level_definition(container, binding));
    }

    resolve_imported(forest, name, Namespace::Operator, imports)
}

// NAMESPACES

/// Which kind of binding an identifier occurrence can legally refer to,
/// decided by its syntactic position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Value,
    Type,
    Constructor,
    Operator,
}

impl Namespace {
    fn admits(self, kind: BindingKind) -> bool {
        match self {
            Namespace::Value => {
                matches!(kind, BindingKind::Value | BindingKind::Port)
            }
            Namespace::Type => matches!(
                kind,
                BindingKind::TypeAlias | BindingKind::UnionType
            ),
            Namespace::Constructor => matches!(
                kind,
                BindingKind::UnionConstructor | BindingKind::TypeAlias
            ),
            Namespace::Operator => matches!(kind, BindingKind::Operator),
        }
    }
}

/// The namespace an uppercase name occupies, decided by its syntactic
/// position: a type in type expressions, a constructor in patterns and
/// expressions.
fn upper_namespace(node: ts::Node) -> Namespace {
    for ancestor in cst::ancestors(node) {
        match ancestor.kind() {
            kind::TYPE_REF
            | kind::TYPE_EXPRESSION
            | kind::TYPE_ANNOTATION
            | kind::PORT_ANNOTATION => return Namespace::Type,
            kind::UNION_PATTERN | kind::PATTERN => {
                return Namespace::Constructor
            }
            kind::VALUE_DECLARATION | kind::FILE => break,
            _ => {}
        }
    }

    Namespace::Constructor
}

// SCOPE WALKING

/// Resolves an unqualified lowercase `name` at `node` by walking outward:
/// enclosing binders first, then the file's top level, then imports.
fn resolve_value_in_scope(
    forest: &Forest,
    container: &TreeContainer,
    node: ts::Node,
    name: &str,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    let source = container.source();

    for ancestor in cst::ancestors(node) {
        match ancestor.kind() {
            kind::VALUE_DECLARATION => {
                // parameters of the enclosing function
                if let Some(left) = cst::child_of_kind(
                    &ancestor,
                    kind::FUNCTION_DECLARATION_LEFT,
                ) {
                    if let Some(binder) =
                        find_pattern_binder(&left, source, name)
                    {
                        return Some(parameter_definition(
                            container,
                            binder,
                            DefinitionKind::FunctionParameter,
                        ));
                    }
                }
            }

            kind::ANONYMOUS_FUNCTION_EXPR => {
                for pattern in cst::named_children(&ancestor)
                    .into_iter()
                    .filter(|child| child.kind() == kind::PATTERN)
                {
                    if let Some(binder) =
                        find_pattern_binder(&pattern, source, name)
                    {
                        return Some(parameter_definition(
                            container,
                            binder,
                            DefinitionKind::AnonymousFunctionParameter,
                        ));
                    }
                }
            }

            kind::CASE_OF_BRANCH => {
                if let Some(pattern) =
                    cst::child_of_kind(&ancestor, kind::PATTERN)
                {
                    if let Some(binder) =
                        find_pattern_binder(&pattern, source, name)
                    {
                        return Some(parameter_definition(
                            container,
                            binder,
                            DefinitionKind::CasePattern,
                        ));
                    }
                }
            }

            kind::LET_IN_EXPR => {
                // all declarations of a let are mutually visible, so the
                // whole group is searched regardless of position
                for declaration in cst::named_children(&ancestor)
                    .into_iter()
                    .filter(|child| {
                        child.kind() == kind::VALUE_DECLARATION
                    })
                {
                    if let Some(found) = let_binding_definition(
                        container,
                        &declaration,
                        source,
                        name,
                    ) {
                        return Some(found);
                    }
                }
            }

            _ => {}
        }
    }

    // file scope
    if let Some(binding) = container.index().value_binding(name) {
        return Some(top_level_definition(container, binding));
    }

    // explicit imports, then the implicit prelude
    resolve_imported(forest, name, Namespace::Value, imports)
}

/// A let declaration either binds a function name or destructures a
/// pattern; both introduce names visible across the whole `let`.
fn let_binding_definition(
    container: &TreeContainer,
    declaration: &ts::Node,
    source: &str,
    name: &str,
) -> Option<Definition> {
    if let Some(left) =
        cst::child_of_kind(declaration, kind::FUNCTION_DECLARATION_LEFT)
    {
        if let Some(fn_name) =
            cst::child_of_kind(&left, kind::LOWER_CASE_IDENTIFIER)
        {
            if cst::text(&fn_name, source) == name {
                return Some(Definition {
                    uri: container.uri().to_path_buf(),
                    name: EcoString::from(name),
                    kind: DefinitionKind::LetBinding,
                    name_node: Span::of_node(&fn_name),
                    declaration: Span::of_node(declaration),
                });
            }
        }
    }

    if let Some(pattern) = cst::child_of_kind(declaration, kind::PATTERN) {
        if let Some(binder) = find_pattern_binder(&pattern, source, name) {
            return Some(parameter_definition(
                container,
                binder,
                DefinitionKind::LetBinding,
            ));
        }
    }

    None
}

/// The binder for `name` inside a pattern subtree, if any: a
/// `lower_pattern` leaf or the identifier it wraps, depending on how the
/// grammar nests the pattern.
fn find_pattern_binder<'t>(
    subtree: &ts::Node<'t>,
    source: &str,
    name: &str,
) -> Option<ts::Node<'t>> {
    cst::descendants(*subtree, &mut |candidate| {
        candidate.kind() == kind::LOWER_PATTERN
            && cst::text(candidate, source) == name
    })
    .into_iter()
    .next()
}

fn resolve_unqualified_upper(
    forest: &Forest,
    container: &TreeContainer,
    name: &str,
    namespace: Namespace,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    let index = container.index();

    let own = match namespace {
        Namespace::Type => index.type_binding(name),
        Namespace::Constructor => index.constructor_binding(name),
        Namespace::Value => index.value_binding(name),
        Namespace::Operator => index.operator_binding(name),
    };

    if let Some(binding) = own {
        return Some(top_level_definition(container, binding));
    }

    resolve_imported(forest, name, namespace, imports)
}

/// Looks `name` up in the unqualified namespace each import exposes. The
/// import list is in shadowing order, so the first hit wins.
fn resolve_imported(
    forest: &Forest,
    name: &str,
    namespace: Namespace,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    for import in imports {
        let Some(exposed) = import.exposed.get(name) else {
            continue;
        };
        if !namespace.admits(exposed.kind) {
            continue;
        }

        let Some(target) = forest.by_module(&exposed.module) else {
            continue;
        };

        let binding = match namespace {
            Namespace::Value => target.index().value_binding(name),
            Namespace::Type => target.index().type_binding(name),
            Namespace::Constructor => {
                target.index().constructor_binding(name)
            }
            Namespace::Operator => target.index().operator_binding(name),
        };

        if let Some(binding) = binding {
            return Some(top_level_definition(target, binding));
        }
    }

    None
}

/// Resolves `Qualifier.name` by finding the import whose local qualifier
/// matches, then looking `name` up in the target module restricted to what
/// it exposes.
fn resolve_qualified(
    forest: &Forest,
    qualifier: &str,
    name: &str,
    namespace: Namespace,
    imports: &[ResolvedImport],
) -> Option<Definition> {
    for import in imports {
        if import.qualifier() != qualifier {
            continue;
        }

        let Some(target) = forest.by_module(&import.module_name) else {
            continue;
        };

        let index = target.index();
        let binding = match namespace {
            Namespace::Value => index.value_binding(name),
            Namespace::Type => index.type_binding(name),
            Namespace::Constructor => index.constructor_binding(name),
            Namespace::Operator => index.operator_binding(name),
        };

        if let Some(binding) =
            binding.filter(|binding| index.is_exposed(binding))
        {
            return Some(top_level_definition(target, binding));
        }
    }

    None
}

/// Resolves an entry of an `exposing (...)` list, either on the module's
/// own declaration or on one of its imports.
fn resolve_exposing_entry(
    forest: &Forest,
    container: &TreeContainer,
    node: ts::Node,
    namespace: Namespace,
) -> Option<Definition> {
    let source = container.source();
    let name = cst::text(&node, source);
    let list = cst::ancestor_of_kind(node, kind::EXPOSING_LIST)?;
    let owner = list.parent()?;

    let target = match owner.kind() {
        kind::MODULE_DECLARATION => container,
        kind::IMPORT_CLAUSE => {
            let module =
                cst::child_of_kind(&owner, kind::UPPER_CASE_QID)?;
            forest.by_module(cst::text(&module, source))?
        }
        _ => return None,
    };

    let index = target.index();
    let binding = match namespace {
        Namespace::Value => index.value_binding(name),
        Namespace::Type => index.type_binding(name),
        Namespace::Constructor => index.constructor_binding(name),
        Namespace::Operator => index.operator_binding(name),
    }?;

    // an import may only name what the source module exposes; the module's
    // own list may name any of its bindings
    if owner.kind() == kind::IMPORT_CLAUSE && !index.is_exposed(binding) {
        return None;
    }

    Some(top_level_definition(target, binding))
}

// QUALIFIED NAME SPLITTING

/// The dotted qualifier formed by the uppercase segments before `node`
/// inside `qid`, or `None` when `node` is the first segment.
fn qid_qualifier(
    qid: &ts::Node,
    node: &ts::Node,
    source: &str,
) -> Option<String> {
    let segments: Vec<&str> = cst::named_children(qid)
        .into_iter()
        .filter(|child| {
            child.kind() == kind::UPPER_CASE_IDENTIFIER
                && child.start_byte() < node.start_byte()
        })
        .map(|child| cst::text(&child, source))
        .collect();

    match segments.is_empty() {
        true => None,
        false => Some(segments.join(".")),
    }
}

/// The uppercase segment following `node` in `qid`, if any.
fn next_qid_segment<'t>(
    qid: &ts::Node<'t>,
    node: &ts::Node,
) -> Option<ts::Node<'t>> {
    cst::named_children(qid).into_iter().find(|child| {
        child.kind() == kind::UPPER_CASE_IDENTIFIER
            && child.start_byte() > node.start_byte()
    })
}

// DEFINITION CONSTRUCTORS

fn top_level_definition(
    container: &TreeContainer,
    binding: &crate::index::TopLevelBinding,
) -> Definition {
    Definition {
        uri: container.uri().to_path_buf(),
        name: binding.name.clone(),
        kind: DefinitionKind::TopLevel(binding.kind),
        name_node: binding.name_node,
        declaration: binding.declaration,
    }
}

fn binder_definition(
    container: &TreeContainer,
    binder: ts::Node,
) -> Definition {
    let kind = cst::ancestors(binder)
        .find_map(|ancestor| match ancestor.kind() {
            kind::FUNCTION_DECLARATION_LEFT => {
                Some(DefinitionKind::FunctionParameter)
            }
            kind::ANONYMOUS_FUNCTION_EXPR => {
                Some(DefinitionKind::AnonymousFunctionParameter)
            }
            kind::CASE_OF_BRANCH => Some(DefinitionKind::CasePattern),
            kind::LET_IN_EXPR => Some(DefinitionKind::LetBinding),
            _ => None,
        })
        .unwrap_or(DefinitionKind::CasePattern);

    parameter_definition(container, binder, kind)
}

fn parameter_definition(
    container: &TreeContainer,
    binder: ts::Node,
    kind: DefinitionKind,
) -> Definition {
    let span = Span::of_node(&binder);
    Definition {
        uri: container.uri().to_path_buf(),
        name: EcoString::from(cst::text(&binder, container.source())),
        kind,
        name_node: span,
        declaration: span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest_of(files: &[(&str, &str)]) -> Forest {
        let mut forest = Forest::new();
        for (uri, source) in files {
            forest.add_or_replace(*uri, *source, true);
        }
        forest
    }

    /// The position of the start of the `n`th occurrence (1-based) of
    /// `needle` in `source`.
    fn position_of(source: &str, needle: &str, n: usize) -> Point {
        let offset = source
            .match_indices(needle)
            .nth(n - 1)
            .map(|(offset, _)| offset)
            .expect("needle occurs often enough");

        let before = &source[..offset];
        Point {
            row: before.matches('\n').count(),
            column: before.len() - before.rfind('\n').map_or(0, |i| i + 1),
        }
    }

    fn definition_at(
        forest: &Forest,
        uri: &str,
        source: &str,
        needle: &str,
        n: usize,
    ) -> Option<Definition> {
        find_definition(
            forest,
            Path::new(uri),
            position_of(source, needle, n),
        )
    }

    #[test]
    fn single_file_definition_and_references() {
        let source = "module A exposing (x)\nx =\n    1\n";
        let forest = forest_of(&[("/p/A.elm", source)]);

        // cursor on the defining `x`
        let def = definition_at(&forest, "/p/A.elm", source, "x =", 1)
            .unwrap();
        assert_eq!(def.name, "x");
        assert_eq!(
            def.kind,
            DefinitionKind::TopLevel(BindingKind::Value)
        );
        assert_eq!(def.uri, Path::new("/p/A.elm"));

        let refs =
            find_references(&forest, &def, &CancelToken::new()).unwrap();

        // the exposing entry and the definition itself
        assert_eq!(refs.len(), 2);
        assert!(refs
            .iter()
            .any(|r| r.kind == ReferenceKind::Definition));
        assert!(refs
            .iter()
            .any(|r| r.kind == ReferenceKind::ExposingClauseEntry));
    }

    #[test]
    fn cross_file_reference_through_exposing() {
        let a = "module A exposing (x)\nx =\n    1\n";
        let b = "module B exposing (..)\n\nimport A exposing (x)\n\ny =\n    x + 1\n";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/B.elm", b)]);

        let def =
            definition_at(&forest, "/p/A.elm", a, "x =", 1).unwrap();

        let refs =
            find_references(&forest, &def, &CancelToken::new()).unwrap();

        let in_b: Vec<_> = refs
            .iter()
            .filter(|r| r.uri == Path::new("/p/B.elm"))
            .collect();

        // the import-list entry and the use in `y`
        assert_eq!(in_b.len(), 2);
        assert!(in_b
            .iter()
            .any(|r| r.kind == ReferenceKind::ImportClauseEntry));
        assert!(in_b.iter().any(|r| r.kind == ReferenceKind::Use));

        // the use in B resolves back to the definition in A
        let use_ref = in_b
            .iter()
            .find(|r| r.kind == ReferenceKind::Use)
            .unwrap();
        let round_trip = find_definition(
            &forest,
            &use_ref.uri,
            forest
                .get(&use_ref.uri)
                .unwrap()
                .node_for_span(use_ref.node)
                .unwrap()
                .start_position(),
        )
        .unwrap();
        assert_eq!(round_trip, def);
    }

    #[test]
    fn unexposed_symbols_have_no_external_references() {
        let a = "module A exposing (y)\nx =\n    1\ny =\n    x\n";
        let b = "module B exposing (..)\n\nimport A exposing (..)\n\nz =\n    2\n";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/B.elm", b)]);

        let def =
            definition_at(&forest, "/p/A.elm", a, "x =", 1).unwrap();
        let refs =
            find_references(&forest, &def, &CancelToken::new()).unwrap();

        assert!(refs
            .iter()
            .all(|r| r.uri == Path::new("/p/A.elm")));
    }

    #[test]
    fn qualified_reference_through_alias() {
        let a = "module A exposing (x)\nx =\n    1\n";
        let b = "module B exposing (..)\n\nimport A as Q\n\ny =\n    Q.x\n";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/B.elm", b)]);

        // cursor on the `x` of `Q.x`
        let def = definition_at(&forest, "/p/B.elm", b, "x\n", 1)
            .expect("Q.x resolves through the alias");
        assert_eq!(def.uri, Path::new("/p/A.elm"));
        assert_eq!(def.name, "x");

        // the original module name is replaced by the alias
        let unaliased =
            "module C exposing (..)\n\nimport A as Q\n\ny =\n    A.x\n";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/C.elm", unaliased)]);
        assert_eq!(
            definition_at(&forest, "/p/C.elm", unaliased, "x\n", 1),
            None
        );
    }

    #[test]
    fn parameter_shadows_top_level() {
        let source = "\
module A exposing (..)

n =
    1

f n =
    n + 1

g =
    n
";
        let forest = forest_of(&[("/p/A.elm", source)]);

        // inside `f`, `n` is the parameter
        let inner =
            definition_at(&forest, "/p/A.elm", source, "n + 1", 1)
                .unwrap();
        assert_eq!(inner.kind, DefinitionKind::FunctionParameter);

        // in `g`, `n` is the top-level binding
        let outer =
            definition_at(&forest, "/p/A.elm", source, "n\n", 1).unwrap();
        assert_eq!(
            outer.kind,
            DefinitionKind::TopLevel(BindingKind::Value)
        );

        // the parameter's references stay inside `f`
        let refs =
            find_references(&forest, &inner, &CancelToken::new()).unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.kind == ReferenceKind::Definition));
        assert!(refs.iter().any(|r| r.kind == ReferenceKind::Use));
    }

    #[test]
    fn let_binding_shadows_import_and_resolves_locally() {
        let a = "module A exposing (helper)\nhelper =\n    1\n";
        let b = "\
module B exposing (..)

import A exposing (helper)

f =
    let
        helper =
            2
    in
    helper
";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/B.elm", b)]);

        let last_use = definition_at(&forest, "/p/B.elm", b, "helper\n", 1)
            .unwrap();
        assert_eq!(last_use.kind, DefinitionKind::LetBinding);
        assert_eq!(last_use.uri, Path::new("/p/B.elm"));
    }

    #[test]
    fn case_pattern_binds_inside_its_branch() {
        let source = "\
module A exposing (..)

f maybe =
    case maybe of
        Just value ->
            value

        Nothing ->
            0
";
        let forest = forest_of(&[("/p/A.elm", source)]);

        let def = definition_at(&forest, "/p/A.elm", source, "value\n", 1)
            .unwrap();
        assert_eq!(def.kind, DefinitionKind::CasePattern);

        let refs =
            find_references(&forest, &def, &CancelToken::new()).unwrap();
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn constructors_resolve_to_the_constructor_not_the_type() {
        let a = "\
module A exposing (Widget(..))

type Widget
    = Button
    | Label
";
        let b = "\
module B exposing (..)

import A exposing (Widget(..))

w =
    Button
";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/B.elm", b)]);

        let def = definition_at(&forest, "/p/B.elm", b, "Button\n", 1)
            .unwrap();
        assert_eq!(
            def.kind,
            DefinitionKind::TopLevel(BindingKind::UnionConstructor)
        );
        assert_eq!(def.uri, Path::new("/p/A.elm"));

        // type position resolves to the union type instead
        let c = "\
module C exposing (..)

import A exposing (Widget)

describe : Widget -> String
describe _ =
    \"widget\"
";
        let forest =
            forest_of(&[("/p/A.elm", a), ("/p/C.elm", c)]);
        let type_def =
            definition_at(&forest, "/p/C.elm", c, "Widget ->", 1).unwrap();
        assert_eq!(
            type_def.kind,
            DefinitionKind::TopLevel(BindingKind::UnionType)
        );
    }

    #[test]
    fn references_respect_cancellation() {
        let a = "module A exposing (x)\nx =\n    1\n";
        let b = "module B exposing (..)\n\nimport A exposing (x)\n\ny =\n    x\n";
        let forest = forest_of(&[("/p/A.elm", a), ("/p/B.elm", b)]);

        let def =
            definition_at(&forest, "/p/A.elm", a, "x =", 1).unwrap();

        let token = CancelToken::new();
        token.cancel();

        assert_eq!(
            find_references(&forest, &def, &token),
            Err(Cancelled)
        );
    }
}
