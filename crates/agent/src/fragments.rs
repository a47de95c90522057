//! Reassembly of streamed tool-call fragments.

use deckhand_core::provider::{ToolCallDelta, WireToolCall};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Collects [`ToolCallDelta`]s for one model turn, keyed by their index.
///
/// `id`, `type` and `name` keep the first non-empty value seen; argument
/// fragments are concatenated in arrival order. Calls come out of
/// [`finish`](Self::finish) in index order.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<u32, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();
        set_once(&mut call.id, &delta.id);
        set_once(&mut call.kind, &delta.kind);
        set_once(&mut call.name, &delta.name);
        if let Some(fragment) = &delta.arguments {
            call.arguments.push_str(fragment);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// The completed calls. Missing ids are synthesized from the index so
    /// every call can still be answered by a tool turn.
    pub fn finish(self) -> Vec<WireToolCall> {
        self.calls
            .into_iter()
            .map(|(index, call)| WireToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                kind: call.kind.unwrap_or_else(|| "function".into()),
                function: deckhand_core::provider::WireFunction {
                    name: call.name.unwrap_or_default(),
                    arguments: call.arguments,
                },
            })
            .collect()
    }
}

fn set_once(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none()
        && let Some(v) = value
        && !v.is_empty()
    {
        *slot = Some(v.clone());
    }
}
