//! Long-lived WebSocket used for chat delivery.
//!
//! Frames are JSON text objects `{"event": <channel>, "data": <payload>}`.
//! Ordering and delivery guarantees are whatever the socket provides; this
//! layer adds no sequencing, dedup or redelivery.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Subscribers = Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>>;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("connect failed after {attempts} attempt(s): {message}")]
    Connect { attempts: u32, message: String },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("realtime channel is closed")]
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub max_attempts: u32,
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            connect_timeout: Duration::from_secs(12),
            backoff_base: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
pub struct RealtimeChannel {
    outbound_tx: mpsc::UnboundedSender<Message>,
    subscribers: Subscribers,
    send_task: Option<JoinHandle<()>>,
    receive_task: Option<JoinHandle<()>>,
}

impl RealtimeChannel {
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self, RealtimeError> {
        Self::connect_with(url, token, &ConnectOptions::default()).await
    }

    pub async fn connect_with(
        url: &str,
        token: Option<&str>,
        options: &ConnectOptions,
    ) -> Result<Self, RealtimeError> {
        let url = socket_url(url, token)?;
        let ws_stream = connect_with_retry(&url, options).await?;
        info!(url = %redacted(&url), "realtime connected");

        let (write_half, read_half) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
        let subscribers = Subscribers::default();

        let send_task = tokio::spawn(network_send_task(write_half, outbound_rx));
        let receive_task = tokio::spawn(network_receive_task(read_half, subscribers.clone()));

        Ok(Self {
            outbound_tx,
            subscribers,
            send_task: Some(send_task),
            receive_task: Some(receive_task),
        })
    }

    /// Queue `payload` on the named channel.
    pub fn send<T: Serialize + ?Sized>(&self, event: &str, payload: &T) -> Result<(), RealtimeError> {
        let envelope = Envelope {
            event: event.to_owned(),
            data: serde_json::to_value(payload)?,
        };
        let frame = serde_json::to_string(&envelope)?;
        self.outbound_tx
            .send(Message::Text(frame.into()))
            .map_err(|_| RealtimeError::Closed)
    }

    /// Payloads published on `event`. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, event: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        register(&self.subscribers, event, tx);
        rx
    }

    pub fn is_open(&self) -> bool {
        !self.outbound_tx.is_closed()
            && self
                .receive_task
                .as_ref()
                .is_some_and(|task| !task.is_finished())
    }

    /// Send a close frame and stop both socket tasks. Open subscriptions end.
    pub async fn close(&mut self) {
        let _ = self.outbound_tx.send(Message::Close(None));
        if let Some(mut task) = self.send_task.take()
            && timeout(CLOSE_TIMEOUT, &mut task).await.is_err()
        {
            task.abort();
        }
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.clear();
        }
        info!("realtime channel closed");
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
    }
}

/// Validate the socket URL and attach the bearer token as `token=`.
pub fn socket_url(raw: &str, token: Option<&str>) -> Result<Url, RealtimeError> {
    let mut url = Url::parse(raw).map_err(|err| RealtimeError::InvalidUrl(err.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(RealtimeError::InvalidUrl(format!(
            "scheme must be ws or wss, got {}",
            url.scheme()
        )));
    }
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

async fn connect_with_retry(url: &Url, options: &ConnectOptions) -> Result<WsStream, RealtimeError> {
    let max_attempts = options.max_attempts.max(1);
    let mut attempt: u32 = 1;
    loop {
        debug!(attempt, max_attempts, url = %redacted(url), "connecting");

        let message = match timeout(options.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws_stream, _response))) => return Ok(ws_stream),
            Ok(Err(err)) => format!("connect failed: {err}"),
            Err(_) => format!("connect timed out after {:?}", options.connect_timeout),
        };
        warn!(attempt, url = %redacted(url), "{message}");
        if attempt >= max_attempts {
            return Err(RealtimeError::Connect {
                attempts: attempt,
                message,
            });
        }

        let backoff = options
            .backoff_base
            .saturating_mul(1_u32 << (attempt - 1).min(16));
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

async fn network_send_task(
    mut ws_write: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            message = outbound_rx.recv() => {
                let Some(message) = message else { break };
                let closing = matches!(message, Message::Close(_));
                if let Err(err) = ws_write.send(message).await {
                    warn!("realtime write failed: {err}");
                    break;
                }
                if closing {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if ws_write.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("realtime send loop ended");
}

async fn network_receive_task(mut ws_read: SplitStream<WsStream>, subscribers: Subscribers) {
    while let Some(next) = ws_read.next().await {
        let message = match next {
            Ok(message) => message,
            Err(err) => {
                warn!("realtime read failed: {err}");
                break;
            }
        };

        match message {
            Message::Text(text) => dispatch(&subscribers, text.as_str()),
            Message::Close(_) => break,
            Message::Binary(_) => warn!("ignoring binary realtime frame"),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    if let Ok(mut subscribers) = subscribers.lock() {
        subscribers.clear();
    }
    debug!("realtime receive loop ended");
}

/// Add `tx` under `event`, dropping listeners whose receiver is gone.
fn register(subscribers: &Subscribers, event: &str, tx: mpsc::UnboundedSender<Value>) {
    let Ok(mut subscribers) = subscribers.lock() else {
        error!(event, "subscriber registry poisoned");
        return;
    };
    let listeners = subscribers.entry(event.to_owned()).or_default();
    listeners.retain(|listener| !listener.is_closed());
    listeners.push(tx);
}

fn dispatch(subscribers: &Subscribers, raw: &str) {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!("dropping malformed realtime frame: {err}");
            return;
        }
    };

    let Ok(mut subscribers) = subscribers.lock() else {
        return;
    };
    let Some(listeners) = subscribers.get_mut(&envelope.event) else {
        trace!(event = %envelope.event, "no subscribers");
        return;
    };
    listeners.retain(|tx| tx.send(envelope.data.clone()).is_ok());
    if listeners.is_empty() {
        subscribers.remove(&envelope.event);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn socket_url_appends_token_and_checks_scheme() {
        let url = socket_url("ws://localhost:8000/ws", Some("a b")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws?token=a+b");
        assert_eq!(redacted(&url), "ws://localhost:8000/ws");

        assert!(matches!(
            socket_url("http://localhost:8000/ws", None),
            Err(RealtimeError::InvalidUrl(_))
        ));
        assert!(socket_url("not a url", None).is_err());
    }

    #[test]
    fn dispatch_routes_by_event_and_prunes_dropped_receivers() {
        let subscribers = Subscribers::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        {
            let mut map = subscribers.lock().unwrap();
            map.entry("sent_message".to_owned()).or_default().push(tx_a);
            map.entry("sent_message".to_owned()).or_default().push(tx_b);
        }
        drop(rx_b);

        dispatch(&subscribers, r#"{"event":"sent_message","data":{"content":"hi"}}"#);
        dispatch(&subscribers, r#"{"event":"typing","data":{}}"#);
        dispatch(&subscribers, "not json");

        assert_eq!(rx_a.try_recv().unwrap(), json!({"content": "hi"}));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(subscribers.lock().unwrap()["sent_message"].len(), 1);
    }

    #[test]
    fn register_prunes_closed_listeners() {
        let subscribers = Subscribers::default();
        for _ in 0..3 {
            let (tx, rx) = mpsc::unbounded_channel();
            register(&subscribers, "sent_message", tx);
            drop(rx);
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        register(&subscribers, "sent_message", tx);
        let (other_tx, _other_rx) = mpsc::unbounded_channel();
        register(&subscribers, "typing", other_tx);

        {
            let map = subscribers.lock().unwrap();
            assert_eq!(map["sent_message"].len(), 1);
            assert_eq!(map["typing"].len(), 1);
        }

        dispatch(&subscribers, r#"{"event":"sent_message","data":1}"#);
        assert_eq!(rx.try_recv().unwrap(), json!(1));
    }
}
