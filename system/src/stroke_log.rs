use crate::{Stroke, StrokeId, SyncMessage};

/// The replicated drawing history of one peer.
///
/// Remote operations are applied in arrival order, not by a logical clock,
/// so two peers converge on the same *set* of live strokes while the element
/// order of their histories may differ after concurrent edits.
///
/// Every local operation returns the message the caller must broadcast on the
/// sync channel. The log itself never touches a transport.
#[derive(Debug, Default)]
pub struct StrokeLog {
    history: Vec<Stroke>,
    redo_stack: Vec<Stroke>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogChange {
    /// One stroke was appended; an incremental draw is enough.
    Appended(Stroke),
    /// Strokes were removed; the whole history must be redrawn.
    Removed,
    Unchanged,
}

impl StrokeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Stroke] {
        &self.history
    }

    pub fn redo_stack(&self) -> &[Stroke] {
        &self.redo_stack
    }

    pub fn contains(&self, stroke_id: &StrokeId) -> bool {
        self.history.iter().any(|s| &s.id == stroke_id)
    }

    /// `None` when the stroke is already live: nothing changed, so nothing
    /// is drawn or sent and the Redo Stack survives.
    pub fn add_local(&mut self, stroke: Stroke) -> Option<SyncMessage> {
        match self.append(stroke) {
            LogChange::Appended(stroke) => {
                self.redo_stack.clear();
                Some(SyncMessage::Stroke(stroke))
            }
            _ => None,
        }
    }

    pub fn apply_remote(&mut self, stroke: Stroke) -> LogChange {
        self.append(stroke)
    }

    /// Undoes the last stroke in local order, whoever authored it.
    pub fn undo_local(&mut self) -> Option<SyncMessage> {
        let stroke = self.history.pop()?;
        let stroke_id = stroke.id;
        log::debug!("Undo {}", stroke_id);
        self.redo_stack.push(stroke);
        Some(SyncMessage::Undo { stroke_id })
    }

    /// Redone strokes go out as a normal add.
    pub fn redo_local(&mut self) -> Option<SyncMessage> {
        let stroke = self.redo_stack.pop()?;
        match self.append(stroke.clone()) {
            LogChange::Appended(_) => Some(SyncMessage::Stroke(stroke)),
            _ => None,
        }
    }

    /// Removes the stroke wherever it sits. Absent ids are a no-op, so
    /// concurrent undo of the same stroke by both peers is harmless.
    pub fn apply_remote_undo(&mut self, stroke_id: &StrokeId) -> LogChange {
        match self.history.iter().position(|s| &s.id == stroke_id) {
            Some(pos) => {
                let stroke = self.history.remove(pos);
                self.redo_stack.push(stroke);
                LogChange::Removed
            }
            None => {
                log::debug!("Remote undo for absent stroke {}", stroke_id);
                LogChange::Unchanged
            }
        }
    }

    pub fn apply_remote_redo(&mut self, stroke: Stroke) -> LogChange {
        self.append(stroke)
    }

    pub fn clear(&mut self) -> SyncMessage {
        self.history.clear();
        self.redo_stack.clear();
        SyncMessage::Clear
    }

    pub fn apply_remote_clear(&mut self) -> LogChange {
        let had_content = !self.history.is_empty() || !self.redo_stack.is_empty();
        self.history.clear();
        self.redo_stack.clear();
        if had_content {
            LogChange::Removed
        } else {
            LogChange::Unchanged
        }
    }

    /// Applies one message received over the sync channel.
    pub fn apply(&mut self, message: SyncMessage) -> LogChange {
        match message {
            SyncMessage::Stroke(stroke) => self.apply_remote(stroke),
            SyncMessage::Redo(stroke) => self.apply_remote_redo(stroke),
            SyncMessage::Undo { stroke_id } => self.apply_remote_undo(&stroke_id),
            SyncMessage::Clear => self.apply_remote_clear(),
        }
    }

    // Ids stay unique inside history; a stroke that is already live is not
    // appended twice.
    fn append(&mut self, stroke: Stroke) -> LogChange {
        if self.contains(&stroke.id) {
            log::debug!("Stroke {} is already live", stroke.id);
            return LogChange::Unchanged;
        }
        self.history.push(stroke.clone());
        LogChange::Appended(stroke)
    }
}
