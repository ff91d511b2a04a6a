use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::error::BridgeError;
use crate::protocol::bridge::PageBridge;
use crate::protocol::field_model::FieldSnapshot;
use crate::protocol::messages::{BridgeCommand, FrameRef, Rect};

#[derive(Debug, Clone)]
struct ScriptedField {
    snapshot: FieldSnapshot,
    value: String,
    rect: Option<Rect>,
    revealed: bool,
    background: Option<String>,
}

#[derive(Debug, Default)]
struct PageState {
    frames: HashMap<FrameRef, Vec<ScriptedField>>,
    focused: Option<(FrameRef, String)>,
    commands: Vec<(FrameRef, BridgeCommand)>,
    field_requests: Vec<FrameRef>,
    focus_handlers: HashSet<(FrameRef, String)>,
    failures: HashMap<&'static str, String>,
}

/// In-process page that answers bridge commands from a scripted DOM.
///
/// `sendTextFields` requests are queued rather than answered inline; the
/// driver drains them with [`ScriptedPage::take_field_requests`] and posts
/// the snapshot back, the way a page script posts `textInputFields`.
#[derive(Debug, Default)]
pub struct ScriptedPage {
    inner: Mutex<PageState>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the fields of `frame`. Fields that survive keep the value the
    /// user typed unless the snapshot carries one.
    pub fn set_fields(&self, frame: &FrameRef, fields: Vec<FieldSnapshot>) {
        let mut state = self.inner.lock();
        let previous = state.frames.remove(frame).unwrap_or_default();
        let fields = fields
            .into_iter()
            .map(|snapshot| {
                let kept = previous.iter().find(|f| f.snapshot.beam_id == snapshot.beam_id);
                let value = snapshot
                    .value
                    .clone()
                    .or_else(|| kept.map(|f| f.value.clone()))
                    .unwrap_or_default();
                ScriptedField {
                    rect: kept.and_then(|f| f.rect),
                    revealed: kept.is_some_and(|f| f.revealed),
                    background: kept.and_then(|f| f.background.clone()),
                    snapshot,
                    value,
                }
            })
            .collect();
        state.frames.insert(frame.clone(), fields);
    }

    /// Current fields of `frame` as the page script would report them.
    pub fn snapshot(&self, frame: &FrameRef) -> Vec<FieldSnapshot> {
        self.inner
            .lock()
            .frames
            .get(frame)
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| FieldSnapshot {
                        value: Some(f.value.clone()),
                        ..f.snapshot.clone()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_value(&self, frame: &FrameRef, id: &str, value: &str) -> bool {
        self.with_field(frame, id, |f| f.value = value.to_string())
    }

    pub fn value(&self, frame: &FrameRef, id: &str) -> Option<String> {
        self.read_field(frame, id, |f| f.value.clone())
    }

    pub fn background(&self, frame: &FrameRef, id: &str) -> Option<String> {
        self.read_field(frame, id, |f| f.background.clone()).flatten()
    }

    pub fn is_revealed(&self, frame: &FrameRef, id: &str) -> bool {
        self.read_field(frame, id, |f| f.revealed).unwrap_or(false)
    }

    pub fn set_rect(&self, frame: &FrameRef, id: &str, rect: Rect) -> bool {
        self.with_field(frame, id, |f| f.rect = Some(rect))
    }

    pub fn set_focused(&self, focused: Option<(FrameRef, String)>) {
        self.inner.lock().focused = focused;
    }

    pub fn focused(&self) -> Option<(FrameRef, String)> {
        self.inner.lock().focused.clone()
    }

    /// Make the next `command` (by wire name) fail with a script error.
    pub fn fail_next(&self, command: &'static str, error: &str) {
        self.inner.lock().failures.insert(command, error.to_string());
    }

    pub fn take_field_requests(&self) -> Vec<FrameRef> {
        std::mem::take(&mut self.inner.lock().field_requests)
    }

    pub fn commands(&self) -> Vec<BridgeCommand> {
        self.inner.lock().commands.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn command_count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .commands
            .iter()
            .filter(|(_, c)| c.name() == name)
            .count()
    }

    pub fn has_focus_handler(&self, frame: &FrameRef, id: &str) -> bool {
        self.inner
            .lock()
            .focus_handlers
            .contains(&(frame.clone(), id.to_string()))
    }

    fn with_field(&self, frame: &FrameRef, id: &str, apply: impl FnOnce(&mut ScriptedField)) -> bool {
        let mut state = self.inner.lock();
        match state
            .frames
            .get_mut(frame)
            .and_then(|fields| fields.iter_mut().find(|f| f.snapshot.beam_id == id))
        {
            Some(field) => {
                apply(field);
                true
            }
            None => false,
        }
    }

    fn read_field<T>(&self, frame: &FrameRef, id: &str, read: impl FnOnce(&ScriptedField) -> T) -> Option<T> {
        let state = self.inner.lock();
        state
            .frames
            .get(frame)
            .and_then(|fields| fields.iter().find(|f| f.snapshot.beam_id == id))
            .map(read)
    }
}

#[async_trait]
impl PageBridge for ScriptedPage {
    async fn execute(&self, frame: &FrameRef, command: BridgeCommand) -> Result<Value, BridgeError> {
        let mut state = self.inner.lock();
        state.commands.push((frame.clone(), command.clone()));
        if let Some(error) = state.failures.remove(command.name()) {
            return Err(BridgeError::Script {
                command: command.name().to_string(),
                error,
            });
        }

        let fields = state.frames.get(frame).cloned().unwrap_or_default();
        let find = |id: &str| fields.iter().find(|f| f.snapshot.beam_id == id);

        let result = match command {
            BridgeCommand::SendTextFields { .. } => {
                state.field_requests.push(frame.clone());
                Value::Null
            }
            BridgeCommand::GetElementRects { ids } => {
                let rects: Vec<Option<Rect>> = ids.iter().map(|id| find(id).and_then(|f| f.rect)).collect();
                json!(rects)
            }
            BridgeCommand::GetTextFieldValues { ids } => {
                let values: Vec<Option<String>> = ids.iter().map(|id| find(id).map(|f| f.value.clone())).collect();
                json!(values)
            }
            BridgeCommand::SetTextFieldValues { fields: fills } => {
                if let Some(page_fields) = state.frames.get_mut(frame) {
                    for fill in fills {
                        if let Some(field) = page_fields.iter_mut().find(|f| f.snapshot.beam_id == fill.id) {
                            if let Some(value) = fill.value {
                                field.value = value;
                            }
                            field.background = fill.background;
                        }
                    }
                }
                Value::Null
            }
            BridgeCommand::TogglePasswordFieldVisibility { ids, visible } => {
                if let Some(page_fields) = state.frames.get_mut(frame) {
                    for field in page_fields.iter_mut().filter(|f| ids.contains(&f.snapshot.beam_id)) {
                        field.revealed = visible;
                    }
                }
                Value::Null
            }
            BridgeCommand::InstallFocusHandlers { ids } => {
                for id in ids {
                    state.focus_handlers.insert((frame.clone(), id));
                }
                Value::Null
            }
            BridgeCommand::InstallSubmitHandler => Value::Null,
            BridgeCommand::GetFocusedField => match &state.focused {
                Some((focused_frame, id)) if focused_frame == frame => Value::String(id.clone()),
                _ => Value::Null,
            },
        };
        Ok(result)
    }
}
