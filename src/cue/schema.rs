//! Schema inference (C7, spec.md §4.7).
//!
//! Builds, per context object, a trie of field references/defaults/required
//! markers and emits it as a CUE `#values`-shaped definition.

use std::collections::BTreeMap;

use crate::cue::lexer;

/// A single field reference as recorded by [`crate::cue::expr`]: the path
/// segments under a context object, plus the access-kind flags from
/// spec.md §3 "Field reference".
#[derive(Debug, Clone, Default)]
pub struct FieldRef {
    pub path: Vec<String>,
    pub required: bool,
    pub range_target: bool,
}

/// One node in the field tree (spec.md §3 "Field tree").
#[derive(Debug, Clone, Default)]
pub struct FieldNode {
    pub children: BTreeMap<String, FieldNode>,
    pub required: bool,
    pub range_target: bool,
    /// CUE literal text for a `default` recorded at this exact path.
    pub default: Option<String>,
}

impl FieldNode {
    fn merge_flags(&mut self, required: bool, range_target: bool) {
        self.required = self.required || required;
        self.range_target = self.range_target || range_target;
    }
}

/// The field tree for one context object (spec.md §3 invariant: merging is
/// monotonic — never removes a node, only strengthens marks).
#[derive(Debug, Clone, Default)]
pub struct FieldTree {
    root: FieldNode,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Records a reference at `path` with the given access flags, creating
    /// intermediate nodes as needed.
    pub fn record_ref(&mut self, path: &[String], required: bool, range_target: bool) {
        if path.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for (i, seg) in path.iter().enumerate() {
            node = node.children.entry(seg.clone()).or_default();
            let is_last = i == path.len() - 1;
            if is_last {
                node.merge_flags(required, range_target);
            }
        }
    }

    /// Records a `default` literal at `path` (spec.md §4.4 `default(v, field)`).
    pub fn record_default(&mut self, path: &[String], cue_literal: &str) {
        if path.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for seg in path {
            node = node.children.entry(seg.clone()).or_default();
        }
        node.default = Some(cue_literal.to_string());
    }

    /// Folds `other` into `self` (spec.md §5 "merges are associative").
    pub fn merge(&mut self, other: &FieldTree) {
        fn merge_node(dst: &mut FieldNode, src: &FieldNode) {
            dst.required = dst.required || src.required;
            dst.range_target = dst.range_target || src.range_target;
            if dst.default.is_none() {
                dst.default = src.default.clone();
            }
            for (k, v) in &src.children {
                merge_node(dst.children.entry(k.clone()).or_default(), v);
            }
        }
        merge_node(&mut self.root, &other.root);
    }

    /// Folds `other`'s children in under `prefix`, creating intermediate
    /// nodes as needed. Used by the helper call-site resolver (spec.md
    /// §4.6 "Resolve call sites") to graft a helper's `#arg` sub-schema
    /// into the caller's field tree at the argument's field path.
    pub fn merge_at(&mut self, prefix: &[String], other: &FieldTree) {
        if prefix.is_empty() {
            self.merge(other);
            return;
        }
        fn merge_node(dst: &mut FieldNode, src: &FieldNode) {
            dst.required = dst.required || src.required;
            dst.range_target = dst.range_target || src.range_target;
            if dst.default.is_none() {
                dst.default = src.default.clone();
            }
            for (k, v) in &src.children {
                merge_node(dst.children.entry(k.clone()).or_default(), v);
            }
        }
        let mut node = &mut self.root;
        for seg in prefix {
            node = node.children.entry(seg.clone()).or_default();
        }
        for (k, v) in &other.root.children {
            merge_node(node.children.entry(k.clone()).or_default(), v);
        }
    }

    /// Emits this tree as a CUE definition body, per the leaf-state table in
    /// spec.md §4.7. `def_name` is the definition's own name (e.g.
    /// `"#values"`); used only for the empty-tree collapse form.
    pub fn emit(&self, def_name: &str) -> String {
        if self.is_empty() {
            return format!("{}: _\n", def_name);
        }
        let mut out = format!("{}: {{\n", def_name);
        emit_children(&self.root, 1, &mut out);
        out.push_str("}\n");
        out
    }
}

fn emit_children(node: &FieldNode, indent: usize, out: &mut String) {
    for (name, child) in &node.children {
        emit_leaf(name, child, indent, out);
    }
    out.push_str(&format!("{}...\n", lexer::indent_str(indent)));
}

fn emit_leaf(name: &str, node: &FieldNode, indent: usize, out: &mut String) {
    let ind = lexer::indent_str(indent);
    let key = lexer::cue_key(name);
    let marker = if node.required { "!" } else { "?" };
    let scalar = "bool | number | string | null";

    if !node.children.is_empty() {
        if node.range_target {
            out.push_str(&format!("{}{}?: [...{{\n", ind, key));
            emit_children(node, indent + 1, out);
            out.push_str(&format!("{}}}]\n", ind));
        } else {
            out.push_str(&format!("{}{}{}: {{\n", ind, key, marker));
            emit_children(node, indent + 1, out);
            out.push_str(&format!("{}}}\n", ind));
        }
        return;
    }

    match (&node.default, node.range_target, node.required) {
        (Some(default), false, _) => {
            out.push_str(&format!(
                "{}{}: *{} | ({})\n",
                ind, key, default, scalar
            ));
        }
        (Some(default), true, _) => {
            out.push_str(&format!("{}{}: *{} | _\n", ind, key, default));
        }
        (None, true, _) => {
            out.push_str(&format!("{}{}{}: _\n", ind, key, marker));
        }
        (None, false, _) => {
            out.push_str(&format!("{}{}{}: {}\n", ind, key, marker, scalar));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_collapses() {
        let tree = FieldTree::new();
        assert_eq!(tree.emit("#values"), "#values: _\n");
    }

    #[test]
    fn scalar_default_leaf() {
        let mut tree = FieldTree::new();
        tree.record_default(&["port".to_string()], "8080");
        let out = tree.emit("#values");
        assert!(out.contains("port: *8080 | (bool | number | string | null)"));
    }

    #[test]
    fn required_leaf_without_default() {
        let mut tree = FieldTree::new();
        tree.record_ref(&["name".to_string()], true, false);
        let out = tree.emit("#values");
        assert!(out.contains("name!: bool | number | string | null"));
    }

    #[test]
    fn range_target_leaf_is_any() {
        let mut tree = FieldTree::new();
        tree.record_ref(&["features".to_string()], false, true);
        let out = tree.emit("#values");
        assert!(out.contains("features?: _"));
    }

    #[test]
    fn interior_node_appends_ellipsis() {
        let mut tree = FieldTree::new();
        tree.record_ref(&["labels".to_string(), "name".to_string()], false, false);
        let out = tree.emit("#values");
        assert!(out.contains("labels?: {"));
        assert!(out.contains("name?: bool | number | string | null"));
    }

    #[test]
    fn merge_is_monotonic() {
        let mut a = FieldTree::new();
        a.record_ref(&["x".to_string()], false, false);
        let mut b = FieldTree::new();
        b.record_ref(&["x".to_string()], true, false);
        a.merge(&b);
        let out = a.emit("#values");
        assert!(out.contains("x!:"));
    }
}
