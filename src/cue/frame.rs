//! YAML frame stack (C2, spec.md §4.2).
//!
//! Tracks open YAML block contexts while the AST walker ([`crate::cue::control`])
//! emits CUE text into a shared buffer, translating YAML indentation into CUE
//! `{`/`}`/`[`/`]` nesting. This is the piece of the core that lets the
//! emitter walk the AST once instead of building and re-serializing a full
//! YAML tree.

use crate::cue::lexer;

/// What a frame closes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Mapping,
    Sequence,
    /// A `- ` list item promoted to a struct (`{ ... },`), used when the
    /// surrounding context is a plain YAML sequence rather than a `range`
    /// body (spec.md §4.2 "list-item-struct").
    ListItemStruct,
}

/// One open YAML block context (spec.md §3 "Frame").
#[derive(Debug, Clone)]
pub struct Frame {
    pub yaml_indent: usize,
    pub cue_indent: usize,
    pub kind: FrameKind,
}

/// A bare `key:` seen at the end of a text fragment, whose value will be
/// supplied by whatever AST node follows (spec.md §3 "Pending key").
#[derive(Debug, Clone)]
pub struct PendingKey {
    pub key: String,
    pub yaml_indent: usize,
}

/// A key paired with an already-resolved CUE expression, awaiting the
/// indent-driven decision between emitting as a leaf or promoting to a
/// block (spec.md §4.2 "deferred key-value").
#[derive(Debug, Clone)]
pub struct DeferredKv {
    pub key: String,
    pub expr: String,
    pub cue_indent: usize,
    /// The YAML indent of the `key:` line that introduced this value —
    /// compared against the next non-empty line's indent to decide leaf
    /// vs. block promotion (spec.md §3 "Pending key"/"deferred key-value").
    pub yaml_indent: usize,
}

/// The emitter's transient state, collapsing the source's several deferred
/// flags into one tagged variable (spec.md §9 "'Pending' states").
#[derive(Debug, Clone, Default)]
pub enum EmitterState {
    #[default]
    Idle,
    PendingKey(PendingKey),
    DeferredKv(DeferredKv),
}

/// The CUE text buffer plus the open-frame stack and deferred emission
/// state described in spec.md §4.2.
#[derive(Debug, Default)]
pub struct Emitter {
    buf: String,
    frames: Vec<Frame>,
    state: EmitterState,
    /// True while inside a `range` body, per spec.md §4.5: list items emit
    /// as bare values rather than struct-wrapped entries.
    pub in_range_body: bool,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> String {
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    fn cue_indent(&self) -> usize {
        self.frames.len()
    }

    /// Current nesting depth, for callers (e.g. [`crate::cue::control`])
    /// that reindent a sub-block's text onto the parent buffer.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn write(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    pub fn write_indent(&mut self) {
        self.buf.push_str(&lexer::indent_str(self.cue_indent()));
    }

    pub fn write_line(&mut self, s: &str) {
        self.write_indent();
        self.buf.push_str(s);
        self.buf.push('\n');
    }

    /// Opens a mapping (`{`) or sequence (`[`) frame at the given YAML
    /// indent, writing its opening token.
    pub fn open_frame(&mut self, yaml_indent: usize, kind: FrameKind, opener: &str) {
        self.write_line(opener);
        self.frames.push(Frame {
            yaml_indent,
            cue_indent: self.cue_indent() + 1,
            kind,
        });
    }

    /// Closes frames whose `yaml_indent >= line_indent`, emitting each
    /// frame's matching close token (spec.md §4.2 "On text input").
    pub fn close_frames_above(&mut self, line_indent: usize) {
        while let Some(top) = self.frames.last() {
            if top.yaml_indent >= line_indent {
                self.close_top_frame();
            } else {
                break;
            }
        }
    }

    fn close_top_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            let closer = match frame.kind {
                FrameKind::Mapping => "}",
                FrameKind::Sequence => "]",
                FrameKind::ListItemStruct => "},",
            };
            self.write_line(closer);
        }
    }

    /// Closes every remaining open frame; mandatory at end of input
    /// (spec.md §4.2 contract).
    pub fn close_all_frames(&mut self) {
        while !self.frames.is_empty() {
            self.close_top_frame();
        }
    }

    pub fn set_pending_key(&mut self, key: String, yaml_indent: usize) {
        self.state = EmitterState::PendingKey(PendingKey { key, yaml_indent });
    }

    pub fn take_pending_key(&mut self) -> Option<PendingKey> {
        match std::mem::take(&mut self.state) {
            EmitterState::PendingKey(pk) => Some(pk),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Records a deferred key-value, to be flushed by [`Self::flush_deferred_leaf`]
    /// or promoted by [`Self::promote_deferred_to_block`].
    pub fn defer_kv(&mut self, key: String, expr: String, yaml_indent: usize) {
        self.state = EmitterState::DeferredKv(DeferredKv {
            key,
            expr,
            cue_indent: self.cue_indent(),
            yaml_indent,
        });
    }

    pub fn has_deferred_kv(&self) -> bool {
        matches!(self.state, EmitterState::DeferredKv(_))
    }

    /// The `yaml_indent` the currently-deferred key-value was introduced
    /// at, if any — callers compare this against the next non-empty
    /// line's indent to decide between [`Self::flush_deferred_leaf`] and
    /// [`Self::promote_deferred_to_block`].
    pub fn deferred_kv_yaml_indent(&self) -> Option<usize> {
        match &self.state {
            EmitterState::DeferredKv(kv) => Some(kv.yaml_indent),
            _ => None,
        }
    }

    /// Flushes a deferred key-value as a leaf: `key: expr`.
    pub fn flush_deferred_leaf(&mut self) {
        if let EmitterState::DeferredKv(kv) = std::mem::take(&mut self.state) {
            self.write_line(&format!("{}: {}", lexer::cue_key(&kv.key), kv.expr));
        }
    }

    /// Promotes a deferred key-value into a block frame: `key: {` is opened
    /// at `yaml_indent`, and the already-resolved value is written as the
    /// block's first line — an embedded value unifying with whatever
    /// sibling fields the subsequent, deeper-indented lines add.
    pub fn promote_deferred_to_block(&mut self, yaml_indent: usize) {
        if let EmitterState::DeferredKv(kv) = std::mem::take(&mut self.state) {
            self.open_frame(yaml_indent, FrameKind::Mapping, &format!("{}: {{", lexer::cue_key(&kv.key)));
            self.write_line(&kv.expr);
        }
    }

    pub fn flush_any_pending(&mut self) {
        if self.has_deferred_kv() {
            self.flush_deferred_leaf();
        }
    }

    /// Saves frame/state so a nested body (`if`/`range`/`with`) can run
    /// with a clean slate and be restored afterward (spec.md §4.5 "state
    /// stacks... are saved and restored around the body").
    pub fn save_state(&mut self) -> (Vec<Frame>, EmitterState) {
        self.flush_any_pending();
        (std::mem::take(&mut self.frames), std::mem::take(&mut self.state))
    }

    pub fn restore_state(&mut self, saved: (Vec<Frame>, EmitterState)) {
        self.frames = saved.0;
        self.state = saved.1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_close_mapping_frame() {
        let mut e = Emitter::new();
        e.open_frame(0, FrameKind::Mapping, "labels: {");
        e.write_line("app: \"x\"");
        e.close_all_frames();
        assert_eq!(e.into_inner(), "labels: {\n\tapp: \"x\"\n}\n");
    }

    #[test]
    fn close_frames_above_closes_only_deeper_frames() {
        let mut e = Emitter::new();
        e.open_frame(0, FrameKind::Mapping, "a: {");
        e.open_frame(2, FrameKind::Mapping, "b: {");
        e.close_frames_above(1);
        // only the inner (yaml_indent=2) frame should have closed
        assert_eq!(e.frames.len(), 1);
    }

    #[test]
    fn deferred_kv_flushes_as_leaf() {
        let mut e = Emitter::new();
        e.defer_kv("port".to_string(), "8080".to_string(), 0);
        assert!(e.has_deferred_kv());
        e.flush_deferred_leaf();
        assert_eq!(e.into_inner(), "port: 8080\n");
    }

    #[test]
    fn deferred_kv_promotes_to_block_with_value_embedded() {
        let mut e = Emitter::new();
        e.defer_kv("labels".to_string(), "#values.labels".to_string(), 0);
        assert_eq!(e.deferred_kv_yaml_indent(), Some(0));
        e.promote_deferred_to_block(0);
        e.write_line("app: \"x\"");
        e.close_all_frames();
        assert_eq!(
            e.into_inner(),
            "labels: {\n\t#values.labels\n\tapp: \"x\"\n}\n"
        );
    }

    #[test]
    fn list_item_struct_closes_with_trailing_comma() {
        let mut e = Emitter::new();
        e.open_frame(0, FrameKind::ListItemStruct, "{");
        e.write_line("name: \"x\"");
        e.close_all_frames();
        assert_eq!(e.into_inner(), "{\n\tname: \"x\"\n},\n");
    }
}
