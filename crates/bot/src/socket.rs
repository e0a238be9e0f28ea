//! Socket Mode transport: opens a websocket through
//! `apps.connections.open`, acks every delivered envelope, and converts
//! raw event payloads into validated [`ChatEvent`]s for the dispatcher.

use core::time::Duration;

use anyhow::{Context as _, Result};
use futures_util::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use plugin_core::{ChatEvent, MessageEvent, ReactionEvent};
use slack_api::{ChannelId, WebApiClient};

use crate::dispatch::Dispatcher;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Run the Socket Mode loop forever, reconnecting on failure.
pub async fn run(client: &WebApiClient, app_token: &str, dispatcher: Dispatcher) -> Result<()> {
    loop {
        match connect_once(client, app_token, &dispatcher).await {
            Ok(()) => info!("Socket closed; reconnecting"),
            Err(e) => warn!(error = %e, "Socket Mode connection failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_once(
    client: &WebApiClient,
    app_token: &str,
    dispatcher: &Dispatcher,
) -> Result<()> {
    let url = client
        .connections_open(app_token)
        .await
        .context("opening socket mode connection")?;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .context("connecting to socket mode endpoint")?;
    info!("Socket Mode connected");
    let (mut write, mut read) = ws.split();

    while let Some(frame) = read.next().await {
        let frame = frame.context("reading socket frame")?;
        match frame {
            WsMessage::Text(text) => {
                let envelope: SocketEnvelope =
                    match serde_json::from_str(text.as_str()) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            debug!(error = %e, "Ignoring undecodable frame");
                            continue;
                        }
                    };
                // Ack before handling so slow plugins never trigger a
                // redelivery.
                if let Some(id) = envelope.envelope_id.as_deref() {
                    let ack = json!({ "envelope_id": id }).to_string();
                    write
                        .send(WsMessage::Text(ack.into()))
                        .await
                        .context("acking envelope")?;
                }
                match envelope.kind.as_str() {
                    "hello" => info!("Socket Mode session established"),
                    "disconnect" => {
                        info!("Server requested disconnect");
                        return Ok(());
                    }
                    "events_api" => {
                        if let Some(event) = envelope
                            .payload
                            .and_then(|p| p.event)
                            .as_ref()
                            .and_then(parse_event)
                        {
                            dispatcher.dispatch(event);
                        }
                    }
                    kind => debug!(kind, "Ignoring envelope"),
                }
            }
            WsMessage::Ping(data) => {
                write
                    .send(WsMessage::Pong(data))
                    .await
                    .context("answering ping")?;
            }
            WsMessage::Close(_) => return Ok(()),
            WsMessage::Binary(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<EventsApiPayload>,
}

#[derive(Debug, Deserialize)]
struct EventsApiPayload {
    #[serde(default)]
    event: Option<serde_json::Value>,
}

/// Wire schema of the event kinds we handle; everything else deserializes
/// to `Other` and is dropped.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        text: Option<String>,
        channel: String,
        ts: String,
        #[serde(default)]
        thread_ts: Option<String>,
    },
    #[serde(rename = "reaction_added")]
    ReactionAdded {
        user: String,
        reaction: String,
        item: WireItem,
    },
    #[serde(rename = "reaction_removed")]
    ReactionRemoved {
        user: String,
        reaction: String,
        item: WireItem,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

/// Validate a raw event payload into a [`ChatEvent`]. Messages with a
/// subtype (edits, joins, bot attachments) and reactions on non-message
/// items are dropped here, before any plugin runs.
fn parse_event(raw: &serde_json::Value) -> Option<ChatEvent> {
    let wire: WireEvent = serde_json::from_value(raw.clone()).ok()?;
    match wire {
        WireEvent::Message {
            subtype,
            user,
            text,
            channel,
            ts,
            thread_ts,
        } => {
            if subtype.is_some() {
                return None;
            }
            Some(ChatEvent::Message(MessageEvent {
                user: user?,
                text: text?,
                channel: ChannelId::new(channel),
                ts,
                thread_ts,
            }))
        }
        WireEvent::ReactionAdded {
            user,
            reaction,
            item,
        } => reaction_event(user, reaction, item).map(ChatEvent::ReactionAdded),
        WireEvent::ReactionRemoved {
            user,
            reaction,
            item,
        } => reaction_event(user, reaction, item).map(ChatEvent::ReactionRemoved),
        WireEvent::Other => None,
    }
}

fn reaction_event(user: String, reaction: String, item: WireItem) -> Option<ReactionEvent> {
    if item.kind != "message" {
        return None;
    }
    Some(ReactionEvent {
        user,
        reaction,
        item_channel: ChannelId::new(item.channel?),
        item_ts: item.ts?,
    })
}
