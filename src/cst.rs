//! Concrete syntax trees parsed using Tree-sitter.
//!
//! The grammar is fixed: `tree-sitter-elm` identifies every node kind the
//! analyses care about, and parsing always yields a tree — syntax errors
//! appear as `ERROR` nodes rather than failures, so downstream passes can
//! keep working on the well-formed subtrees around them.

use tree_sitter as ts;

use crate::span::{Point, Span};

/// Node kind names from the `tree-sitter-elm` grammar.
///
/// Matching on `&'static str` kinds rather than numeric kind ids keeps the
/// analyses readable and independent of the grammar's id assignment.
pub mod kind {
    pub const FILE: &str = "file";

    pub const MODULE_DECLARATION: &str = "module_declaration";
    pub const IMPORT_CLAUSE: &str = "import_clause";
    pub const AS_CLAUSE: &str = "as_clause";

    pub const EXPOSING_LIST: &str = "exposing_list";
    pub const EXPOSED_VALUE: &str = "exposed_value";
    pub const EXPOSED_TYPE: &str = "exposed_type";
    pub const EXPOSED_OPERATOR: &str = "exposed_operator";
    pub const EXPOSED_UNION_CONSTRUCTORS: &str = "exposed_union_constructors";
    pub const EXPOSED_UNION_CONSTRUCTOR: &str = "exposed_union_constructor";
    pub const DOUBLE_DOT: &str = "double_dot";

    pub const VALUE_DECLARATION: &str = "value_declaration";
    pub const FUNCTION_DECLARATION_LEFT: &str = "function_declaration_left";
    pub const TYPE_ANNOTATION: &str = "type_annotation";
    pub const PORT_ANNOTATION: &str = "port_annotation";
    pub const TYPE_DECLARATION: &str = "type_declaration";
    pub const TYPE_ALIAS_DECLARATION: &str = "type_alias_declaration";
    pub const UNION_VARIANT: &str = "union_variant";
    pub const INFIX_DECLARATION: &str = "infix_declaration";

    pub const LET_IN_EXPR: &str = "let_in_expr";
    pub const CASE_OF_EXPR: &str = "case_of_expr";
    pub const CASE_OF_BRANCH: &str = "case_of_branch";
    pub const ANONYMOUS_FUNCTION_EXPR: &str = "anonymous_function_expr";

    pub const PATTERN: &str = "pattern";
    pub const LOWER_PATTERN: &str = "lower_pattern";
    pub const UNION_PATTERN: &str = "union_pattern";

    pub const VALUE_EXPR: &str = "value_expr";
    pub const VALUE_QID: &str = "value_qid";
    pub const UPPER_CASE_QID: &str = "upper_case_qid";
    pub const TYPE_REF: &str = "type_ref";
    pub const TYPE_EXPRESSION: &str = "type_expression";
    pub const FIELD_ACCESS_EXPR: &str = "field_access_expr";
    pub const RECORD_BASE_IDENTIFIER: &str = "record_base_identifier";

    pub const LOWER_CASE_IDENTIFIER: &str = "lower_case_identifier";
    pub const UPPER_CASE_IDENTIFIER: &str = "upper_case_identifier";
    pub const OPERATOR_IDENTIFIER: &str = "operator_identifier";

    pub const BLOCK_COMMENT: &str = "block_comment";
    pub const ERROR: &str = "ERROR";
}

/// The opening sigil of an Elm documentation comment.
pub const DOC_COMMENT_PREFIX: &str = "{-|";

pub struct Parser {
    parser: ts::Parser,
}

impl Parser {
    pub fn new() -> Self {
        let mut parser = ts::Parser::new();
        parser
            .set_language(&tree_sitter_elm::LANGUAGE.into())
            .expect("Failed to load Tree-sitter grammar for Elm");

        Self { parser }
    }

    /// Parses `source` into a fresh tree.
    ///
    /// Edits arrive as whole-file replacements with no edit ranges, so there
    /// is nothing to feed `Tree::edit` and the previous tree cannot be
    /// reused. Parsing is pure with respect to `source`.
    pub fn parse(&mut self, source: &str) -> ts::Tree {
        self.parser
            .parse(source, None)
            .expect("Failed to parse, probably due to a parser timeout")
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the smallest named node under `root` that covers `point`.
pub fn node_at(root: ts::Node<'_>, point: Point) -> Option<ts::Node<'_>> {
    root.named_descendant_for_point_range(point, point)
}

/// Returns the smallest named node under `root` covering exactly `span`,
/// used to recover a node from a span-valued view of the same tree.
pub fn node_for_span(root: ts::Node<'_>, span: Span) -> Option<ts::Node<'_>> {
    root.named_descendant_for_byte_range(
        span.start as usize,
        span.end as usize,
    )
}

/// The source text of `node`.
///
/// Node byte ranges always lie on UTF-8 boundaries of the text they were
/// parsed from, so this only returns `""` when `node` belongs to a
/// different tree than `source`.
pub fn text<'s>(node: &ts::Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

/// Collects the named children of `node`.
pub fn named_children<'t>(node: &ts::Node<'t>) -> Vec<ts::Node<'t>> {
    let mut cursor = node.walk();
    let children = node.named_children(&mut cursor).collect();
    children
}

/// Returns the first named child of `node` with the given kind.
pub fn child_of_kind<'t>(
    node: &ts::Node<'t>,
    kind: &str,
) -> Option<ts::Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|child| child.kind() == kind);
    found
}

/// Iterates the ancestors of `node`, innermost first, excluding `node`.
pub fn ancestors<'t>(
    node: ts::Node<'t>,
) -> impl Iterator<Item = ts::Node<'t>> {
    std::iter::successors(node.parent(), |node| node.parent())
}

/// Returns the nearest ancestor of `node` with the given kind.
pub fn ancestor_of_kind<'t>(
    node: ts::Node<'t>,
    kind: &str,
) -> Option<ts::Node<'t>> {
    ancestors(node).find(|ancestor| ancestor.kind() == kind)
}

/// Collects every named descendant of `node` (including `node` itself) for
/// which `keep` returns `true`, in document order.
pub fn descendants<'t>(
    node: ts::Node<'t>,
    keep: &mut dyn FnMut(&ts::Node<'t>) -> bool,
) -> Vec<ts::Node<'t>> {
    let mut found = Vec::new();
    let mut cursor = node.walk();

    'walk: loop {
        let current = cursor.node();
        if current.is_named() && keep(&current) {
            found.push(current);
        }

        if cursor.goto_first_child() {
            continue;
        }

        loop {
            // back at the root of the walk: never escape into its siblings
            if cursor.node() == node {
                break 'walk;
            }
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    found
}

/// Collects the named identifier descendants of `node` whose text equals
/// `name`, in document order.
pub fn identifier_occurrences<'t>(
    node: ts::Node<'t>,
    source: &str,
    name: &str,
) -> Vec<ts::Node<'t>> {
    descendants(node, &mut |candidate| {
        matches!(
            candidate.kind(),
            kind::LOWER_CASE_IDENTIFIER
                | kind::UPPER_CASE_IDENTIFIER
                | kind::OPERATOR_IDENTIFIER
        ) && text(candidate, source) == name
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recovers_from_syntax_errors() {
        let mut parser = Parser::new();
        let tree = parser.parse("module A exposing (x)\nx = = 1\n");

        assert_eq!(tree.root_node().kind(), kind::FILE);
        assert!(tree.root_node().has_error());
    }

    #[test]
    fn node_at_finds_the_smallest_identifier() {
        let mut parser = Parser::new();
        let source = "module A exposing (x)\nx = 1\n";
        let tree = parser.parse(source);

        // the `x` on line 1
        let node =
            node_at(tree.root_node(), Point { row: 1, column: 0 }).unwrap();

        assert_eq!(node.kind(), kind::LOWER_CASE_IDENTIFIER);
        assert_eq!(text(&node, source), "x");
    }

    #[test]
    fn identifier_occurrences_are_in_document_order() {
        let mut parser = Parser::new();
        let source = "module A exposing (x)\nx = 1\ny = x + x\n";
        let tree = parser.parse(source);

        let hits = identifier_occurrences(tree.root_node(), source, "x");

        assert_eq!(hits.len(), 4);
        let spans = hits
            .iter()
            .map(|node| Span::of_node(node))
            .collect::<Vec<_>>();
        let mut sorted = spans.clone();
        sorted.sort();
        assert_eq!(spans, sorted);
    }
}
