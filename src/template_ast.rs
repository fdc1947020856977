//! Abstract syntax tree for the Helm/Sprig-flavored Go template language.
//!
//! This is the input AST the core transformer walks. Producing it from raw
//! template text is, per design, a thin front end (see [`crate::template_parser`])
//! — the shapes here are what the transformer actually consumes.

use std::fmt;

/// A sequential run of nodes, e.g. the body of a file, an `if` branch, or a
/// `range` loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// True if every node is whitespace-only text or a comment.
    ///
    /// Used by the top-level-if detection in `cue::control` (spec.md §4.5):
    /// a template's root is eligible for top-level guard extraction only
    /// when everything preceding the lone `if` is whitespace/comments.
    pub fn is_blank_prefix(&self) -> bool {
        self.nodes.iter().all(|n| match n {
            Node::Text(t) => t.text.trim().is_empty(),
            Node::Comment(_) => true,
            _ => false,
        })
    }
}

/// A node in the parsed template tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Action(ActionNode),
    Comment(String),
    If(IfNode),
    Range(RangeNode),
    With(WithNode),
    Template(TemplateNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
}

/// `{{ <pipe> }}` — a bare value-producing action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub pipe: Pipe,
}

/// `{{ if <pipe> }} then {{ else }} else {{ end }}`
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub cond: Pipe,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

/// `{{ range <pipe> }} body {{ else }} empty {{ end }}`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNode {
    pub pipe: Pipe,
    pub body: Block,
    pub else_block: Option<Block>,
}

/// `{{ with <pipe> }} body {{ else }} else {{ end }}`
#[derive(Debug, Clone, PartialEq)]
pub struct WithNode {
    pub pipe: Pipe,
    pub body: Block,
    pub else_block: Option<Block>,
}

/// `{{ template "name" <pipe>? }}` or `{{ include "name" <pipe>? }}` used as
/// a standalone statement (most uses of `include` appear as a [`Command`]
/// inside a [`Pipe`], but a bare `{{ template ... }}` call is its own node
/// since it has no return value consumed by anything outside it).
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub name: NameExpr,
    pub arg: Option<Pipe>,
}

/// The name argument to `template`/`include`: almost always a string
/// literal, but the language permits an expression (spec.md §4.6's
/// "dynamic include").
#[derive(Clone, PartialEq)]
pub enum NameExpr {
    Literal(String),
    Dynamic(Box<Arg>),
}

/// A pipe: optional local-variable declarations, then one or more commands
/// chained left-to-right.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipe {
    /// `$x, $y := ...` — local variables this pipe declares (rare: only the
    /// first command's result is used for multi-value declarations in the
    /// subset this crate supports; see spec.md §3 "Range/with binding").
    pub declared_locals: Vec<String>,
    pub commands: Vec<Command>,
}

impl Pipe {
    pub fn single(arg: Arg) -> Self {
        Self {
            declared_locals: Vec::new(),
            commands: vec![Command {
                name: None,
                args: vec![arg],
            }],
        }
    }
}

/// One command in a pipe: `name arg1 arg2 ...` or, for the first command in
/// a pipe, a bare value (`name` is `None` and there is exactly one arg).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// `None` for a bare value in first-command position (e.g. `.Values.x`,
    /// a literal, or `$var`); `Some(name)` for a named function/pipeline
    /// call.
    pub name: Option<String>,
    pub args: Vec<Arg>,
}

/// An argument node — anything that can appear as a pipe/command operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `.A.b.c` — a field access chain rooted at the current dot or a
    /// configured context object. Empty path means bare `.`.
    Field(Vec<String>),
    /// `$x.b.c` — a variable reference with an optional field path off it.
    Variable(String, Vec<String>),
    /// A literal string, already unescaped.
    String(String),
    /// A literal number, kept as source text (CUE accepts the same integer
    /// and float lexical forms as Go for the cases this crate handles).
    Number(String),
    Bool(bool),
    Nil,
    /// A nested, parenthesized pipe: `(foo .Bar | baz)`.
    Pipe(Box<Pipe>),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(t) => write!(f, "Text({:?})", t.text),
            Node::Action(_) => write!(f, "Action"),
            Node::Comment(_) => write!(f, "Comment"),
            Node::If(_) => write!(f, "If"),
            Node::Range(_) => write!(f, "Range"),
            Node::With(_) => write!(f, "With"),
            Node::Template(t) => write!(f, "Template({:?})", t.name),
        }
    }
}

impl fmt::Debug for NameExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameExpr::Literal(s) => write!(f, "{:?}", s),
            NameExpr::Dynamic(_) => write!(f, "<dynamic>"),
        }
    }
}
