//! Pause-scoped state: the variable reference table and the mapping from
//! Vim's variable namespaces to DAP scopes.

use serde::Serialize;
use strum::IntoStaticStr;

use crate::vim::protocol::FrameKind;

/// Vim's variable namespaces, in the order scopes are presented for a
/// frame. `Local` (`l:`) only exists inside function frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeCode {
    Local,
    Script,
    Global,
    Buffer,
    Window,
    Tab,
    Vim,
}

impl ScopeCode {
    pub fn title(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Script => "Script",
            Self::Global => "Global",
            Self::Buffer => "Buffer",
            Self::Window => "Window",
            Self::Tab => "Tab",
            Self::Vim => "Vim",
        }
    }

    pub fn wire_name(self) -> &'static str {
        self.into()
    }

    fn for_frame(kind: FrameKind) -> &'static [Self] {
        const FUNCTION: &[ScopeCode] = &[
            ScopeCode::Local,
            ScopeCode::Script,
            ScopeCode::Global,
            ScopeCode::Buffer,
            ScopeCode::Window,
            ScopeCode::Tab,
            ScopeCode::Vim,
        ];
        match kind {
            FrameKind::Function => FUNCTION,
            // Script-level frames have no l: namespace.
            FrameKind::Script | FrameKind::Other => &FUNCTION[1..],
        }
    }
}

/// One issued variables reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableReference {
    pub stack_level: i64,
    pub scope: ScopeCode,
}

/// Issues the integer handles DAP uses to refer back to a scope.
///
/// Append-only within one pause: a handle stays valid for the whole stop,
/// even when the editor asks for the same frame's scopes twice. Recycled
/// wholesale at the next stop, so handles can stay small.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: Vec<VariableReference>,
}

impl ReferenceTable {
    /// Drops every handle. Runs each time the interpreter stops.
    pub fn recycle(&mut self) {
        self.entries.clear();
    }

    pub fn append(&mut self, reference: VariableReference) -> i64 {
        self.entries.push(reference);
        self.entries.len() as i64
    }

    pub fn resolve(&self, handle: i64) -> Option<VariableReference> {
        if handle < 1 {
            return None;
        }
        self.entries.get(handle as usize - 1).copied()
    }

    /// Issues one handle per scope the frame exposes, in presentation
    /// order.
    pub fn scopes_for(&mut self, kind: FrameKind, stack_level: i64) -> Vec<(i64, ScopeCode)> {
        ScopeCode::for_frame(kind)
            .iter()
            .map(|&scope| {
                let handle = self.append(VariableReference { stack_level, scope });
                (handle, scope)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn handles_start_at_one_and_grow() {
        let mut table = ReferenceTable::default();
        let first = table.append(VariableReference {
            stack_level: 0,
            scope: ScopeCode::Global,
        });
        let second = table.append(VariableReference {
            stack_level: 1,
            scope: ScopeCode::Local,
        });
        assert_eq!((first, second), (1, 2));
        assert_eq!(table.resolve(1).unwrap().scope, ScopeCode::Global);
        assert_eq!(table.resolve(2).unwrap().stack_level, 1);
        assert_eq!(table.resolve(0), None);
        assert_eq!(table.resolve(3), None);
    }

    #[test]
    fn function_frames_expose_local_scope() {
        let mut table = ReferenceTable::default();
        let scopes = table.scopes_for(FrameKind::Function, 0);
        let names = scopes.iter().map(|(_, scope)| scope.title()).collect_vec();
        assert_eq!(
            names,
            ["Local", "Script", "Global", "Buffer", "Window", "Tab", "Vim"]
        );
    }

    #[test]
    fn script_frames_skip_local_scope() {
        let mut table = ReferenceTable::default();
        let scopes = table.scopes_for(FrameKind::Script, 2);
        assert!(scopes.iter().all(|(_, scope)| *scope != ScopeCode::Local));
        assert_eq!(scopes.len(), 6);
    }

    #[test]
    fn repeated_scope_requests_keep_old_handles_valid() {
        let mut table = ReferenceTable::default();
        let first = table.scopes_for(FrameKind::Script, 0);
        let again = table.scopes_for(FrameKind::Script, 0);
        // Handles never alias, and the earlier ones still resolve.
        assert_ne!(first[0].0, again[0].0);
        assert!(table.resolve(first[0].0).is_some());

        table.recycle();
        assert_eq!(table.resolve(first[0].0), None);
    }

    #[test]
    fn wire_names_are_lowercase() {
        assert_eq!(ScopeCode::Local.wire_name(), "local");
        assert_eq!(ScopeCode::Vim.wire_name(), "vim");
    }
}
