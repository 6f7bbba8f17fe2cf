//! Pause state machine and the single command slot.

use std::fmt;

use strum::IntoStaticStr;
use thiserror::Error;

use crate::vim::link::Link;

/// Where the debuggee currently is, as far as the bridge knows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionState {
    #[default]
    Disconnected,
    AwaitingInit,
    Ready,
    Running,
    Paused,
    Terminated,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingInit => "awaiting-init",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Which blocking poll the hook is parked on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Initialize,
    GetCommand,
}

/// The one envelope the hook is blocked on, if any. The interpreter is
/// frozen until this exact envelope gets its reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSlot {
    pub envelope_id: i64,
    pub kind: SlotKind,
}

/// Resume vocabulary understood by the hook; these are Vim's own `:debug`
/// commands, forwarded verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum StepCommand {
    #[strum(serialize = "cont")]
    Continue,
    #[strum(serialize = "next")]
    Next,
    #[strum(serialize = "step")]
    StepIn,
    #[strum(serialize = "finish")]
    StepOut,
    #[strum(serialize = "quit")]
    Quit,
}

impl StepCommand {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("a {0:?} poll is already open")]
    AlreadyOpen(SlotKind),
    #[error("no poll is open")]
    NoneOpen,
    #[error("the open poll is {actual:?}, not {wanted:?}")]
    WrongKind { wanted: SlotKind, actual: SlotKind },
}

/// Everything the state machine guards, behind one lock so that checking
/// the state, consuming the slot, and queueing the reply line happen as a
/// unit. Link sends are channel pushes, so holding the lock across them
/// is fine.
#[derive(Debug, Default)]
pub struct SessionFlow {
    pub state: ExecutionState,
    pub link: Option<Link>,
    slot: Option<CommandSlot>,
    pub pending_break: Option<String>,
    /// Did we (logically) start the debuggee, or attach to a pre-existing
    /// one? Decides how hard shutdown hits the interpreter.
    pub spawned: bool,
}

impl SessionFlow {
    /// Parks the hook on a new slot. A second open attempt is rejected,
    /// never overwritten: the hook sends one poll at a time, so a
    /// duplicate means the channel is confused and the older envelope is
    /// the one actually blocking the interpreter.
    pub fn open_slot(&mut self, envelope_id: i64, kind: SlotKind) -> Result<(), SlotError> {
        if let Some(open) = self.slot {
            return Err(SlotError::AlreadyOpen(open.kind));
        }
        self.slot = Some(CommandSlot { envelope_id, kind });
        Ok(())
    }

    /// Takes the slot, but only if its kind matches what the caller is
    /// about to answer. An `Initialize` poll must never be consumed by a
    /// stepping reply or vice versa.
    pub fn close_slot(&mut self, wanted: SlotKind) -> Result<CommandSlot, SlotError> {
        let open = self.slot.ok_or(SlotError::NoneOpen)?;
        if open.kind != wanted {
            return Err(SlotError::WrongKind {
                wanted,
                actual: open.kind,
            });
        }
        self.slot = None;
        Ok(open)
    }

    pub fn slot(&self) -> Option<CommandSlot> {
        self.slot
    }

    pub fn reset_slot(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_never_overwritten() {
        let mut flow = SessionFlow::default();
        flow.open_slot(3, SlotKind::GetCommand).unwrap();
        let error = flow.open_slot(4, SlotKind::GetCommand).unwrap_err();
        assert_eq!(error, SlotError::AlreadyOpen(SlotKind::GetCommand));
        // The original envelope is still the one on record.
        assert_eq!(flow.slot().unwrap().envelope_id, 3);
    }

    #[test]
    fn close_requires_matching_kind() {
        let mut flow = SessionFlow::default();
        flow.open_slot(1, SlotKind::Initialize).unwrap();
        let error = flow.close_slot(SlotKind::GetCommand).unwrap_err();
        assert_eq!(
            error,
            SlotError::WrongKind {
                wanted: SlotKind::GetCommand,
                actual: SlotKind::Initialize,
            }
        );
        let slot = flow.close_slot(SlotKind::Initialize).unwrap();
        assert_eq!(slot.envelope_id, 1);
        assert_eq!(flow.close_slot(SlotKind::Initialize), Err(SlotError::NoneOpen));
    }

    #[test]
    fn step_commands_use_vim_vocabulary() {
        assert_eq!(StepCommand::Continue.as_str(), "cont");
        assert_eq!(StepCommand::Next.as_str(), "next");
        assert_eq!(StepCommand::StepIn.as_str(), "step");
        assert_eq!(StepCommand::StepOut.as_str(), "finish");
        assert_eq!(StepCommand::Quit.as_str(), "quit");
    }
}
