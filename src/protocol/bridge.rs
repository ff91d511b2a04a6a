use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::LOG_INTERNAL;
use crate::error::{BridgeError, ProtocolError};
use crate::protocol::messages::{BridgeCommand, FieldAutofill, FrameRef, Rect};

/// Outbound half of the page channel.
///
/// Implementors only provide `execute`; the typed commands decode the JSON
/// result the page script answers with. Every command is asynchronous and
/// nothing here times out: an unanswered query simply never resolves.
#[async_trait]
pub trait PageBridge: Send + Sync {
    async fn execute(&self, frame: &FrameRef, command: BridgeCommand) -> Result<Value, BridgeError>;

    async fn send_text_fields(&self, frame: &FrameRef, frame_identifier: Option<u32>) -> Result<(), BridgeError> {
        self.execute(frame, BridgeCommand::send_text_fields(frame_identifier))
            .await
            .map(|_| ())
    }

    async fn get_element_rects(&self, ids: &[String], frame: &FrameRef) -> Result<Vec<Option<Rect>>, BridgeError> {
        let result = self.execute(frame, BridgeCommand::get_element_rects(ids)).await?;
        decode_list(result, "getElementRects")
    }

    async fn get_text_field_values(&self, ids: &[String], frame: &FrameRef) -> Result<Vec<Option<String>>, BridgeError> {
        let result = self.execute(frame, BridgeCommand::get_text_field_values(ids)).await?;
        decode_list(result, "getTextFieldValues")
    }

    async fn set_text_field_values(&self, fields: &[FieldAutofill], frame: &FrameRef) -> Result<(), BridgeError> {
        self.execute(frame, BridgeCommand::set_text_field_values(fields))
            .await
            .map(|_| ())
    }

    async fn toggle_password_field_visibility(
        &self,
        ids: &[String],
        visible: bool,
        frame: &FrameRef,
    ) -> Result<(), BridgeError> {
        self.execute(frame, BridgeCommand::toggle_password_field_visibility(ids, visible))
            .await
            .map(|_| ())
    }

    async fn install_focus_handlers(&self, ids: &[String], frame: &FrameRef) -> Result<(), BridgeError> {
        self.execute(frame, BridgeCommand::install_focus_handlers(ids))
            .await
            .map(|_| ())
    }

    async fn install_submit_handler(&self, frame: &FrameRef) -> Result<(), BridgeError> {
        self.execute(frame, BridgeCommand::InstallSubmitHandler)
            .await
            .map(|_| ())
    }

    async fn get_focused_field(&self, frame: &FrameRef) -> Result<Option<String>, BridgeError> {
        let result = self.execute(frame, BridgeCommand::GetFocusedField).await?;
        decode_list_item(result, "getFocusedField")
    }
}

/// Page scripts answer list queries either with a JSON array or with a
/// string holding the JSON-encoded array.
fn decode_list<T: DeserializeOwned>(result: Value, context: &str) -> Result<Vec<T>, BridgeError> {
    decode_list_item(result, context)
}

fn decode_list_item<T: DeserializeOwned>(result: Value, context: &str) -> Result<T, BridgeError> {
    let value = match result {
        Value::String(s) if s.trim_start().starts_with('[') => {
            serde_json::from_str(&s).map_err(|e| ProtocolError::JsonParse {
                context: context.to_string(),
                source: e,
            })?
        }
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| {
            ProtocolError::JsonParse {
                context: context.to_string(),
                source: e,
            }
            .into()
        })
}

/// A command waiting for its answer from the page.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCommand {
    pub id: u64,
    pub frame: FrameRef,
    pub command: BridgeCommand,
}

type PendingCommands = HashMap<u64, oneshot::Sender<Result<Value, BridgeError>>>;

/// Removes a command from the pending map when its caller stops waiting,
/// answered or not.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingCommands>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// `PageBridge` over an in-process channel: commands go out as
/// `OutboundCommand`s, answers come back through `resolve` / `reject`
/// matched on the command id. Answers may arrive in any order.
pub struct ChannelBridge {
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<OutboundCommand>,
    pending: Mutex<PendingCommands>,
}

impl ChannelBridge {
    pub fn new() -> (ChannelBridge, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = ChannelBridge {
            next_id: AtomicU64::new(1),
            outbound: tx,
            pending: Mutex::new(HashMap::new()),
        };
        (bridge, rx)
    }

    /// Deliver the page's answer to command `id`. Returns false for unknown
    /// or already answered ids (at-least-once delivery duplicates).
    pub fn resolve(&self, id: u64, result: Value) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => tx.send(Ok(result)).is_ok(),
            None => {
                debug!(target: LOG_INTERNAL, "dropping answer for unknown command {}", id);
                false
            }
        }
    }

    pub fn reject(&self, id: u64, command: &str, error: &str) -> bool {
        match self.pending.lock().remove(&id) {
            Some(tx) => tx
                .send(Err(BridgeError::Script {
                    command: command.to_string(),
                    error: error.to_string(),
                }))
                .is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl PageBridge for ChannelBridge {
    async fn execute(&self, frame: &FrameRef, command: BridgeCommand) -> Result<Value, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        let name = command.name();
        let outbound = OutboundCommand {
            id,
            frame: frame.clone(),
            command,
        };
        if self.outbound.send(outbound).is_err() {
            return Err(BridgeError::Closed(format!("could not send {}", name)));
        }

        rx.await
            .map_err(|_| BridgeError::Closed(format!("no answer for {}", name)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values_from_json_string_or_array() {
        let from_string: Vec<Option<String>> =
            decode_list(Value::String(r#"["bob", null]"#.into()), "values").unwrap();
        assert_eq!(from_string, vec![Some("bob".to_string()), None]);

        let from_array: Vec<Option<String>> =
            decode_list(serde_json::json!(["", "x"]), "values").unwrap();
        assert_eq!(from_array, vec![Some(String::new()), Some("x".to_string())]);

        assert!(decode_list::<Option<String>>(serde_json::json!({"a": 1}), "values").is_err());
    }

    #[tokio::test]
    async fn channel_bridge_matches_answers_by_id() {
        let (bridge, mut rx) = ChannelBridge::new();
        let frame = FrameRef::new("https://a.test/");

        let responder = async {
            let first = rx.recv().await.unwrap();
            assert_eq!(first.command.name(), "getFocusedField");
            assert!(bridge.resolve(first.id, Value::String("u".into())));
            assert!(!bridge.resolve(first.id, Value::Null));
        };
        let (focused, _) = tokio::join!(bridge.get_focused_field(&frame), responder);
        assert_eq!(focused.unwrap(), Some("u".to_string()));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_command_leaves_no_pending_entry() {
        let (bridge, mut rx) = ChannelBridge::new();
        let frame = FrameRef::new("https://a.test/");

        let ids = vec!["p".to_string()];
        {
            let query = bridge.get_text_field_values(&ids, &frame);
            tokio::pin!(query);
            tokio::select! {
                biased;
                _ = &mut query => panic!("nobody answered"),
                _ = tokio::task::yield_now() => {}
            }
            assert_eq!(bridge.pending_count(), 1);
        }
        assert_eq!(bridge.pending_count(), 0);

        let cmd = rx.recv().await.unwrap();
        assert!(!bridge.resolve(cmd.id, serde_json::json!(["late"])));
    }

    #[tokio::test]
    async fn channel_bridge_surfaces_script_errors() {
        let (bridge, mut rx) = ChannelBridge::new();
        let frame = FrameRef::new("https://a.test/");

        let responder = async {
            let cmd = rx.recv().await.unwrap();
            bridge.reject(cmd.id, cmd.command.name(), "ReferenceError");
        };
        let (result, _) = tokio::join!(bridge.install_submit_handler(&frame), responder);
        match result {
            Err(BridgeError::Script { command, .. }) => assert_eq!(command, "installSubmitHandler"),
            other => panic!("expected script error, got {:?}", other),
        }
    }
}
