//! Text edits grouped per lowered construct. A group is applied whole or
//! not at all, and never shifts the lines that follow it.

use oxc_span::Span;
use std::collections::{BTreeMap, BTreeSet};

/// Marks where a group may put the line breaks its replacements removed.
/// Only placed where a line break cannot change how the code parses.
pub(super) const PAD: char = '\u{1}';

#[derive(Debug, Clone)]
pub(super) struct Edit {
    start: u32,
    end: u32,
    text: String,
    /// Orders insertions at one offset: closers, then hoisted statements,
    /// then openers.
    rank: (u8, u32),
}

#[derive(Debug, Default)]
pub(super) struct Group {
    edits: Vec<Edit>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
            rank: (1, 0),
        });
    }

    pub fn replace_span(&mut self, span: Span, text: impl Into<String>) {
        self.replace(span.start, span.end, text);
    }

    /// A statement hoisted to the start of a function or the program.
    pub fn hoist(&mut self, at: u32, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    /// Text written right before `construct`; outer constructs open first.
    pub fn open(&mut self, construct: Span, text: impl Into<String>) {
        self.edits.push(Edit {
            start: construct.start,
            end: construct.start,
            text: text.into(),
            rank: (2, u32::MAX - construct.end),
        });
    }

    /// Text written right after `construct`; inner constructs close first.
    pub fn close(&mut self, construct: Span, text: impl Into<String>) {
        self.edits.push(Edit {
            start: construct.end,
            end: construct.end,
            text: text.into(),
            rank: (0, u32::MAX - construct.start),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Turns the pad markers into the line breaks the replaced text held.
    fn finish(mut self, source: &str) -> Vec<Edit> {
        self.edits.sort_by_key(|edit| (edit.start, edit.end, edit.rank));

        let removed: usize = self
            .edits
            .iter()
            .map(|edit| newlines(&source[edit.start as usize..edit.end as usize]))
            .sum();
        let added: usize = self.edits.iter().map(|edit| newlines(&edit.text)).sum();
        let missing = removed.saturating_sub(added);

        let last_pad = self.edits.iter().rposition(|edit| edit.text.contains(PAD));
        for (index, edit) in self.edits.iter_mut().enumerate() {
            if Some(index) == last_pad {
                if let Some(at) = edit.text.rfind(PAD) {
                    edit.text.replace_range(at..at + PAD.len_utf8(), &"\n".repeat(missing));
                }
            }
            edit.text.retain(|c| c != PAD);
        }
        if last_pad.is_none() && missing > 0 {
            if let Some(edit) = self.edits.last_mut() {
                edit.text.push_str(&format!("/*{}*/", "\n".repeat(missing)));
            }
        }
        self.edits
    }
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// Accepts groups in order, skipping any that touch text an earlier
/// accepted group replaces.
#[derive(Default)]
pub(super) struct Accepted {
    replaced: BTreeMap<u32, u32>,
    inserts: BTreeSet<u32>,
    edits: Vec<Edit>,
}

impl Accepted {
    pub fn offer(&mut self, group: Group, source: &str) -> bool {
        if group.is_empty() || group.edits.iter().any(|edit| self.conflicts(edit)) {
            return false;
        }
        for edit in group.finish(source) {
            if edit.start == edit.end {
                self.inserts.insert(edit.start);
            } else {
                self.replaced.insert(edit.start, edit.end);
            }
            self.edits.push(edit);
        }
        true
    }

    fn conflicts(&self, edit: &Edit) -> bool {
        if edit.start == edit.end {
            // Strictly inside a replaced range.
            return self
                .replaced
                .range(..edit.start)
                .next_back()
                .is_some_and(|(_, &end)| end > edit.start);
        }
        let overlaps = self
            .replaced
            .range(..edit.end)
            .next_back()
            .is_some_and(|(_, &end)| end > edit.start);
        overlaps || self.inserts.range(edit.start + 1..edit.end).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|edit| (edit.start, edit.end, edit.rank));

        let mut out = String::with_capacity(source.len() + source.len() / 4);
        let mut cursor = 0;
        for edit in &self.edits {
            let start = edit.start as usize;
            if start < cursor {
                continue;
            }
            out.push_str(&source[cursor..start]);
            out.push_str(&edit.text);
            cursor = edit.end as usize;
        }
        out.push_str(&source[cursor..]);
        out
    }
}
