use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::field_model::FieldSnapshot;

/// Frame address, keyed by the frame's href.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRef(pub String);

impl FrameRef {
    pub fn new(href: impl Into<String>) -> Self {
        FrameRef(href.into())
    }

    pub fn href(&self) -> &str {
        &self.0
    }

    /// Blank frames never carry fields worth querying.
    pub fn is_blank(&self) -> bool {
        self.0.is_empty() || self.0 == "about:blank"
    }
}

impl std::fmt::Display for FrameRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect { x, y, width, height }
    }

    pub fn offset_by(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// Geometry of one frame relative to its parent, as reported by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub href: String,
    #[serde(default)]
    pub parent_href: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
    #[serde(default = "unknown_extent")]
    pub width: f64,
    #[serde(default = "unknown_extent")]
    pub height: f64,
}

fn unknown_extent() -> f64 {
    -1.0
}

impl FrameInfo {
    pub fn root(href: &str) -> Self {
        FrameInfo {
            href: href.to_string(),
            parent_href: href.to_string(),
            x: 0.0,
            y: 0.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: -1.0,
            height: -1.0,
        }
    }

    pub fn child(href: &str, parent_href: &str, x: f64, y: f64) -> Self {
        FrameInfo {
            parent_href: parent_href.to_string(),
            x,
            y,
            ..FrameInfo::root(href)
        }
    }

    pub fn is_child(&self) -> bool {
        !self.href.is_empty() && !self.parent_href.is_empty() && self.href != self.parent_href
    }
}

/// Messages posted by the page script to the engine.
///
/// A missing `frame` designates the main frame of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BridgeMessage {
    Loaded {
        url: String,
        #[serde(default)]
        frame: Option<FrameRef>,
    },
    TextInputFields {
        fields: Vec<FieldSnapshot>,
        #[serde(default)]
        frame: Option<FrameRef>,
    },
    TextInputFocusIn {
        id: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        frame: Option<FrameRef>,
    },
    TextInputFocusOut {
        id: String,
        #[serde(default)]
        frame: Option<FrameRef>,
    },
    FormSubmit {
        id: String,
        #[serde(default)]
        frame: Option<FrameRef>,
    },
    Resize {
        width: f64,
        height: f64,
    },
    FrameBounds {
        frames: Vec<FrameInfo>,
    },
    FrameScroll {
        href: String,
        scroll_x: f64,
        scroll_y: f64,
    },
}

impl BridgeMessage {
    pub fn parse(payload: &str) -> Result<BridgeMessage, ProtocolError> {
        serde_json::from_str(payload).map_err(|e| ProtocolError::JsonParse {
            context: "inbound bridge message".into(),
            source: e,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BridgeMessage::Loaded { .. } => "loaded",
            BridgeMessage::TextInputFields { .. } => "textInputFields",
            BridgeMessage::TextInputFocusIn { .. } => "textInputFocusIn",
            BridgeMessage::TextInputFocusOut { .. } => "textInputFocusOut",
            BridgeMessage::FormSubmit { .. } => "formSubmit",
            BridgeMessage::Resize { .. } => "resize",
            BridgeMessage::FrameBounds { .. } => "frameBounds",
            BridgeMessage::FrameScroll { .. } => "frameScroll",
        }
    }
}

/// One value to write into a page field. `value: None` leaves the value alone
/// (used when only toggling visibility).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAutofill {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl FieldAutofill {
    pub fn filled(id: &str, value: &str, background: Option<&str>) -> Self {
        FieldAutofill {
            id: id.to_string(),
            value: Some(value.to_string()),
            background: background.map(|b| b.to_string()),
        }
    }
}

/// Commands sent by the engine to the page script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BridgeCommand {
    SendTextFields {
        #[serde(default)]
        frame_identifier: Option<u32>,
    },
    GetElementRects {
        ids: Vec<String>,
    },
    GetTextFieldValues {
        ids: Vec<String>,
    },
    SetTextFieldValues {
        fields: Vec<FieldAutofill>,
    },
    TogglePasswordFieldVisibility {
        ids: Vec<String>,
        visible: bool,
    },
    InstallFocusHandlers {
        ids: Vec<String>,
    },
    InstallSubmitHandler,
    GetFocusedField,
}

impl BridgeCommand {
    pub fn send_text_fields(frame_identifier: Option<u32>) -> Self {
        BridgeCommand::SendTextFields { frame_identifier }
    }

    pub fn get_element_rects(ids: &[String]) -> Self {
        BridgeCommand::GetElementRects { ids: ids.to_vec() }
    }

    pub fn get_text_field_values(ids: &[String]) -> Self {
        BridgeCommand::GetTextFieldValues { ids: ids.to_vec() }
    }

    pub fn set_text_field_values(fields: &[FieldAutofill]) -> Self {
        BridgeCommand::SetTextFieldValues {
            fields: fields.to_vec(),
        }
    }

    pub fn toggle_password_field_visibility(ids: &[String], visible: bool) -> Self {
        BridgeCommand::TogglePasswordFieldVisibility {
            ids: ids.to_vec(),
            visible,
        }
    }

    pub fn install_focus_handlers(ids: &[String]) -> Self {
        BridgeCommand::InstallFocusHandlers { ids: ids.to_vec() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BridgeCommand::SendTextFields { .. } => "sendTextFields",
            BridgeCommand::GetElementRects { .. } => "getElementRects",
            BridgeCommand::GetTextFieldValues { .. } => "getTextFieldValues",
            BridgeCommand::SetTextFieldValues { .. } => "setTextFieldValues",
            BridgeCommand::TogglePasswordFieldVisibility { .. } => "togglePasswordFieldVisibility",
            BridgeCommand::InstallFocusHandlers { .. } => "installFocusHandlers",
            BridgeCommand::InstallSubmitHandler => "installSubmitHandler",
            BridgeCommand::GetFocusedField => "getFocusedField",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_focus_in_without_frame() {
        let msg = BridgeMessage::parse(r#"{"type":"textInputFocusIn","id":"u","text":"bo"}"#).unwrap();
        assert_eq!(
            msg,
            BridgeMessage::TextInputFocusIn {
                id: "u".into(),
                text: Some("bo".into()),
                frame: None,
            }
        );
    }

    #[test]
    fn parses_frame_scroll_with_camel_case_fields() {
        let msg = BridgeMessage::parse(
            r#"{"type":"frameScroll","href":"https://a.test/","scrollX":0,"scrollY":120.5}"#,
        )
        .unwrap();
        assert_eq!(msg.name(), "frameScroll");
        match msg {
            BridgeMessage::FrameScroll { scroll_y, .. } => assert_eq!(scroll_y, 120.5),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_message_type() {
        let err = BridgeMessage::parse(r#"{"type":"teleport","id":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("inbound bridge message"));
    }

    #[test]
    fn commands_serialize_with_cmd_tag() {
        let json = serde_json::to_value(BridgeCommand::toggle_password_field_visibility(
            &["p".to_string()],
            true,
        ))
        .unwrap();
        assert_eq!(json["cmd"], "togglePasswordFieldVisibility");
        assert_eq!(json["visible"], true);

        let json = serde_json::to_value(BridgeCommand::InstallSubmitHandler).unwrap();
        assert_eq!(json, serde_json::json!({"cmd": "installSubmitHandler"}));
    }

    #[test]
    fn frame_info_defaults_unknown_extent() {
        let info: FrameInfo = serde_json::from_str(r#"{"href":"https://a.test/f"}"#).unwrap();
        assert_eq!(info.width, -1.0);
        assert!(!info.is_child());
    }
}
