use chrono::Utc;
use hack2heart_core::{ChatMessage, ChatroomId, SENT_MESSAGE_EVENT, UserProfile};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiClient, ApiError},
    realtime::RealtimeChannel,
};

/// One chat room: history, outgoing drafts and live incoming messages.
#[derive(Debug)]
pub struct ChatScreen {
    api: ApiClient,
    room_id: ChatroomId,
    current_user: Option<UserProfile>,
    messages: Vec<ChatMessage>,
    incoming: Option<mpsc::UnboundedReceiver<Value>>,
}

impl ChatScreen {
    pub fn new(api: ApiClient, room_id: impl Into<ChatroomId>) -> Self {
        Self {
            api,
            room_id: room_id.into(),
            current_user: None,
            messages: Vec::new(),
            incoming: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        self.current_user.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Fetch the signed-in user, then the room history.
    pub async fn load(&mut self) -> Result<(), ApiError> {
        let me = self.api.me().await?;
        let history = self.api.chat_history(&self.room_id).await?;
        info!(room = %self.room_id, messages = history.len(), "chat loaded");
        self.current_user = Some(me);
        self.messages = history;
        Ok(())
    }

    /// Start receiving `sent_message` events from `channel`.
    pub fn attach(&mut self, channel: &RealtimeChannel) {
        self.incoming = Some(channel.subscribe(SENT_MESSAGE_EVENT));
    }

    /// Post a draft. Blank drafts are ignored and return `false`.
    ///
    /// After the server accepts the message a local copy stamped with the
    /// current time is appended.
    pub async fn send(&mut self, draft: &str) -> Result<bool, ApiError> {
        let content = draft.trim();
        if content.is_empty() {
            return Ok(false);
        }

        self.api.post_chat_message(&self.room_id, content).await?;
        match &self.current_user {
            Some(user) => self.messages.push(ChatMessage {
                chatroom_id: self.room_id.clone(),
                user_id: user.id,
                content: content.to_owned(),
                created_at: Utc::now(),
            }),
            None => debug!("sender unknown, skipping local echo"),
        }
        Ok(true)
    }

    /// Append a realtime payload if it belongs to this room.
    pub fn receive(&mut self, payload: Value) -> bool {
        let message: ChatMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("ignoring malformed chat payload: {err}");
                return false;
            }
        };
        if message.chatroom_id != self.room_id {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Apply every payload already queued by the socket. Returns how many
    /// were appended.
    pub fn drain_incoming(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(incoming) = self.incoming.as_mut() {
            while let Ok(payload) = incoming.try_recv() {
                pending.push(payload);
            }
        }
        let mut appended = 0;
        for payload in pending {
            if self.receive(payload) {
                appended += 1;
            }
        }
        appended
    }

    /// Wait for the next message in this room. `None` once the socket is
    /// gone or no channel is attached.
    pub async fn next_incoming(&mut self) -> Option<&ChatMessage> {
        loop {
            let payload = self.incoming.as_mut()?.recv().await?;
            if self.receive(payload) {
                return self.messages.last();
            }
        }
    }
}
