//! Control messages exchanged with the host environment.
//!
//! Messages are JSON objects. Session traffic (`sessionInfo`,
//! `requestSessionInfo`) names its kind in a `type` field; routing and
//! notification traffic (`updateContent`, `openPanel`, `changeSidebar`,
//! `alert`, `log`) uses a `command` field. Inbound decoding accepts either
//! key for every kind.

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::SerializeMap,
};
use serde_json::{Map, Value};

use crate::{
    CoreError, Session,
    view::{Surface, View},
};

const TYPE_KEY: &str = "type";
const COMMAND_KEY: &str = "command";

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Session pushed at startup and in reply to `requestSessionInfo`.
    SessionInfo { session: Option<Session> },
    UpdateContent {
        content_type: String,
        options: Option<Value>,
    },
}

impl<'de> Deserialize<'de> for InboundMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut frame = Map::<String, Value>::deserialize(deserializer)?;
        let kind = match frame.remove(TYPE_KEY).or_else(|| frame.remove(COMMAND_KEY)) {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(D::Error::custom(format!("message kind must be a string, got {other}")));
            }
            None => return Err(D::Error::custom("missing field `type` or `command`")),
        };

        match kind.as_str() {
            "sessionInfo" => {
                let session = match frame.remove("session") {
                    None | Some(Value::Null) => None,
                    Some(raw) => Some(serde_json::from_value(raw).map_err(D::Error::custom)?),
                };
                Ok(InboundMessage::SessionInfo { session })
            }
            "updateContent" => {
                let content_type = match frame.remove("contentType") {
                    Some(Value::String(content_type)) => content_type,
                    _ => return Err(D::Error::custom("updateContent needs a string `contentType`")),
                };
                let options = frame.remove("options").filter(|options| !options.is_null());
                Ok(InboundMessage::UpdateContent {
                    content_type,
                    options,
                })
            }
            other => Err(D::Error::custom(format!("unknown message kind {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    RequestSessionInfo,
    OpenPanel { panel_id: String, title: String },
    ChangeSidebar { sidebar_id: String, title: String },
    Alert { text: String },
    Log { text: String },
}

impl OutboundMessage {
    /// Ask the host to show `view` on its surface.
    pub fn open_view(view: View) -> Self {
        match view.surface() {
            Surface::Panel => OutboundMessage::OpenPanel {
                panel_id: view.identifier().to_owned(),
                title: view.title().to_owned(),
            },
            Surface::Sidebar => OutboundMessage::ChangeSidebar {
                sidebar_id: view.identifier().to_owned(),
                title: view.title().to_owned(),
            },
        }
    }
}

impl Serialize for OutboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            OutboundMessage::RequestSessionInfo => {
                map.serialize_entry(TYPE_KEY, "requestSessionInfo")?;
            }
            OutboundMessage::OpenPanel { panel_id, title } => {
                map.serialize_entry(COMMAND_KEY, "openPanel")?;
                map.serialize_entry("panelId", panel_id)?;
                map.serialize_entry("title", title)?;
            }
            OutboundMessage::ChangeSidebar { sidebar_id, title } => {
                map.serialize_entry(COMMAND_KEY, "changeSidebar")?;
                map.serialize_entry("sidebarId", sidebar_id)?;
                map.serialize_entry("title", title)?;
            }
            OutboundMessage::Alert { text } => {
                map.serialize_entry(COMMAND_KEY, "alert")?;
                map.serialize_entry("text", text)?;
            }
            OutboundMessage::Log { text } => {
                map.serialize_entry(COMMAND_KEY, "log")?;
                map.serialize_entry("text", text)?;
            }
        }
        map.end()
    }
}

pub fn decode_inbound(raw: &str) -> Result<InboundMessage, CoreError> {
    serde_json::from_str(raw).map_err(|err| CoreError::HostMessage(err.to_string()))
}

pub fn encode_outbound(message: &OutboundMessage) -> Result<String, CoreError> {
    serde_json::to_string(message).map_err(|err| CoreError::HostMessage(err.to_string()))
}
