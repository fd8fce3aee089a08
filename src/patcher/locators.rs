use crate::{error::{HealError, Result},
            patcher::literal::decode_string_literal};
use indexmap::IndexMap;
use std::{fs, ops::Range, path::Path};
use tree_sitter::{Node, Parser, Tree};

/// Class whose body declares the named selectors
pub const LOCATOR_CLASS: &str = "Locators";

/// One `NAME = (<kind>, "<selector>")` assignment found in the locator class
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedAssignment {
    /// Left-hand identifier
    pub name: String,

    /// Source text of the first tuple element, e.g. `By.CSS_SELECTOR`
    pub kind: String,

    /// Decoded selector literal
    pub selector: String,

    /// 1-based line of the assignment
    pub line: usize,

    /// Byte range of the selector literal, quotes included
    pub value_range: Range<usize>,
}

/// Named selectors declared in a page-object module
#[derive(Debug, Clone, Default)]
pub struct LocatorTable {
    assignments: Vec<LocatedAssignment>,
}

impl LocatorTable {
    /// Read the `Locators` class of a Python file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        Self::parse_named(&source, LOCATOR_CLASS, &path.display().to_string())
    }

    /// Read the `Locators` class of Python source text
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_named(source, LOCATOR_CLASS, "<source>")
    }

    /// Read every class called `class_name`; `origin` names the source in errors
    pub fn parse_named(source: &str, class_name: &str, origin: &str) -> Result<Self> {
        let tree = parse_python(source, origin)?;

        let mut assignments = Vec::new();
        collect_classes(tree.root_node(), source, class_name, &mut assignments);

        log::debug!("Found {} locator assignments in {}", assignments.len(), origin);
        Ok(Self { assignments })
    }

    /// All recognized assignments, in source order, duplicates included
    pub fn assignments(&self) -> &[LocatedAssignment] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// The assignment for `name`, if exactly one exists
    pub fn find(&self, name: &str) -> Option<&LocatedAssignment> {
        let mut matches = self.assignments.iter().filter(|a| a.name == name);
        let first = matches.next()?;
        if matches.next().is_some() {
            log::warn!("Locator '{}' is assigned more than once; leaving it alone", name);
            return None;
        }
        Some(first)
    }

    /// Name to selector, in source order. Ambiguous names are left out.
    pub fn selectors(&self) -> IndexMap<String, String> {
        self.assignments
            .iter()
            .filter(|a| self.assignments.iter().filter(|b| b.name == a.name).count() == 1)
            .map(|a| (a.name.clone(), a.selector.clone()))
            .collect()
    }

    /// Name of the first assignment whose selector is exactly `selector`
    pub fn name_for_selector(&self, selector: &str) -> Option<&str> {
        self.assignments.iter().find(|a| a.selector == selector).map(|a| a.name.as_str())
    }
}

fn parse_python(source: &str, origin: &str) -> Result<Tree> {
    let source_error = |reason: String| HealError::SourceParse { path: origin.to_string(), reason };

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| source_error(format!("Python grammar unavailable: {}", e)))?;

    let tree = parser.parse(source, None).ok_or_else(|| source_error("Parser produced no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let reason = match first_error(root) {
            Some(node) => {
                let at = node.start_position();
                format!("Syntax error at line {}, column {}", at.row + 1, at.column + 1)
            }
            None => "Syntax error".to_string(),
        };
        return Err(source_error(reason));
    }

    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children.into_iter().filter(|c| c.has_error()).find_map(first_error)
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn collect_classes(node: Node<'_>, source: &str, class_name: &str, out: &mut Vec<LocatedAssignment>) {
    if node.kind() == "class_definition"
        && node.child_by_field_name("name").map(|n| text(n, source)) == Some(class_name)
    {
        if let Some(body) = node.child_by_field_name("body") {
            collect_assignments(body, source, out);
        }
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_classes(child, source, class_name, out);
    }
}

fn collect_assignments(body: Node<'_>, source: &str, out: &mut Vec<LocatedAssignment>) {
    let mut cursor = body.walk();
    for statement in body.named_children(&mut cursor) {
        if statement.kind() != "expression_statement" {
            continue;
        }
        let Some(assignment) = statement.named_child(0) else {
            continue;
        };
        if assignment.kind() != "assignment" {
            continue;
        }
        if let Some(located) = locator_assignment(assignment, source) {
            out.push(located);
        }
    }
}

/// `NAME = (kind, "selector")`, with or without parentheses
fn locator_assignment(assignment: Node<'_>, source: &str) -> Option<LocatedAssignment> {
    let left = assignment.child_by_field_name("left")?;
    let right = assignment.child_by_field_name("right")?;
    if left.kind() != "identifier" || !matches!(right.kind(), "tuple" | "expression_list") {
        return None;
    }

    let mut cursor = right.walk();
    let elements: Vec<Node<'_>> = right.named_children(&mut cursor).filter(|n| n.kind() != "comment").collect();
    let [kind, value] = elements.as_slice() else {
        return None;
    };
    if value.kind() != "string" {
        return None;
    }

    let selector = decode_string_literal(text(*value, source))?;

    Some(LocatedAssignment {
        name: text(left, source).to_string(),
        kind: text(*kind, source).to_string(),
        selector,
        line: assignment.start_position().row + 1,
        value_range: value.byte_range(),
    })
}
