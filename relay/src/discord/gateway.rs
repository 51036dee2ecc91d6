//! Discord Gateway Session
//!
//! WebSocket session against the Discord gateway with heartbeating, session
//! resume and automatic reconnection. Guild metadata is kept in
//! [`GatewayState`]; `GUILD_MEMBER_ADD` dispatches are handed to a
//! [`MemberJoinHandler`].

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use super::cache::{GatewayState, GuildInfo};
use super::model::{intents, opcode, GatewayPayload, Guild, GuildMemberAdd, Hello, Ready};
use crate::join::MemberRecord;

/// Default gateway endpoint (API v10, JSON encoding).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Intents requested on identify.
pub const RELAY_INTENTS: u64 = intents::GUILDS | intents::GUILD_MEMBERS;

/// Cap for the reconnect backoff.
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Receives member joins from the gateway. Must not block.
pub trait MemberJoinHandler: Send + Sync {
    fn on_member_join(&self, member: MemberRecord);
}

/// Reasons a gateway connection ended.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid gateway payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("gateway closed the connection (code {code}): {reason}")]
    Closed { code: u16, reason: String },
    #[error("connection closed before HELLO")]
    MissingHello,
    #[error("heartbeat was not acknowledged")]
    HeartbeatTimeout,
    #[error("gateway requested a reconnect")]
    ReconnectRequested,
    #[error("session invalidated (resumable: {resumable})")]
    InvalidSession { resumable: bool },
    #[error("gateway stream ended")]
    StreamEnded,
}

impl GatewayError {
    /// Close codes that will fail again on reconnect.
    ///
    /// 4004 authentication failed, 4010/4011 sharding, 4012 API version,
    /// 4013 invalid intents, 4014 privileged intents not enabled.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Closed {
                code: 4004 | 4010 | 4011 | 4012 | 4013 | 4014,
                ..
            }
        )
    }

    /// Whether the next connection may resume the current session.
    pub const fn allows_resume(&self) -> bool {
        match self {
            Self::InvalidSession { resumable } => *resumable,
            // Invalid sequence, session timed out.
            Self::Closed { code, .. } => !matches!(*code, 1000 | 1001 | 4007 | 4009),
            _ => true,
        }
    }
}

/// Resume bookkeeping carried across reconnects.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub resume_url: Option<String>,
    pub sequence: Option<u64>,
}

impl SessionInfo {
    pub const fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Reconnect delay: `2^min(attempt, 5)` seconds, capped at 30 seconds.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.min(5))).min(MAX_RECONNECT_BACKOFF)
}

/// Append the version/encoding query to a bare resume URL.
pub fn with_gateway_params(url: &str) -> String {
    if url.contains('?') {
        url.to_string()
    } else {
        format!("{}/?v=10&encoding=json", url.trim_end_matches('/'))
    }
}

fn close_error(frame: Option<CloseFrame>) -> GatewayError {
    match frame {
        Some(frame) => GatewayError::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        },
        None => GatewayError::StreamEnded,
    }
}

/// A bot session on the Discord gateway.
pub struct Gateway {
    token: String,
    url: String,
    state: Arc<GatewayState>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(token: impl Into<String>, url: impl Into<String>, state: Arc<GatewayState>) -> Self {
        Self {
            token: token.into(),
            url: url.into(),
            state,
        }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Keep a session alive until a fatal error occurs.
    pub async fn run<H: MemberJoinHandler>(&self, handler: &H) -> Result<(), GatewayError> {
        let mut session = SessionInfo::default();
        let mut attempt = 0u32;

        loop {
            let result = self.connect_and_serve(handler, &mut session).await;
            let was_ready = self.state.is_ready();
            self.state.set_ready(false);

            match result {
                Ok(()) => info!("Gateway connection closed"),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Gateway connection failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    if !e.allows_resume() {
                        session.clear();
                    }
                    warn!(error = %e, resumable = session.can_resume(), "Gateway connection lost");
                }
            }

            attempt = if was_ready { 1 } else { attempt + 1 };
            let backoff = reconnect_backoff(attempt);
            info!("Reconnecting to gateway in {:?} (attempt {})", backoff, attempt);
            sleep(backoff).await;
        }
    }

    async fn connect_and_serve<H: MemberJoinHandler>(
        &self,
        handler: &H,
        session: &mut SessionInfo,
    ) -> Result<(), GatewayError> {
        let url = match (&session.resume_url, session.can_resume()) {
            (Some(resume_url), true) => with_gateway_params(resume_url),
            _ => self.url.clone(),
        };
        info!(url = %url, "Connecting to gateway");

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let hello: Hello = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
                    if payload.op == opcode::HELLO {
                        break serde_json::from_value(payload.d)?;
                    }
                }
                Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(GatewayError::MissingHello),
            }
        };

        let opening = if session.can_resume() {
            debug!("Resuming gateway session");
            self.resume_payload(session)
        } else {
            debug!("Identifying with gateway");
            self.identify_payload()
        };
        write.send(Message::text(opening.to_string())).await?;

        let interval = Duration::from_millis(hello.heartbeat_interval.max(1));
        let jitter = interval.mul_f64(rand::thread_rng().gen_range(0.0..1.0));
        let mut heartbeat = interval_at(Instant::now() + jitter, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Err(GatewayError::HeartbeatTimeout);
                    }
                    write.send(Message::text(heartbeat_payload(session.sequence).to_string())).await?;
                    awaiting_ack = true;
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => return Err(close_error(frame)),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                        Ok(p) => p,
                        Err(e) => {
                            let truncated: String = text.chars().take(200).collect();
                            warn!(error = %e, payload_preview = %truncated, "Failed to parse gateway payload");
                            continue;
                        }
                    };

                    if let Some(seq) = payload.s {
                        session.sequence = Some(seq);
                    }

                    match payload.op {
                        opcode::DISPATCH => {
                            let event = payload.t.unwrap_or_default();
                            if let Err(e) = self.handle_dispatch(&event, payload.d, handler, session) {
                                warn!(event = %event, error = %e, "Failed to handle gateway dispatch");
                            }
                        }
                        opcode::HEARTBEAT => {
                            write.send(Message::text(heartbeat_payload(session.sequence).to_string())).await?;
                        }
                        opcode::HEARTBEAT_ACK => awaiting_ack = false,
                        opcode::RECONNECT => return Err(GatewayError::ReconnectRequested),
                        opcode::INVALID_SESSION => {
                            return Err(GatewayError::InvalidSession {
                                resumable: payload.d.as_bool().unwrap_or(false),
                            });
                        }
                        other => trace!(op = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    /// Apply one dispatch event to the session state and handler.
    pub fn handle_dispatch<H: MemberJoinHandler>(
        &self,
        event: &str,
        data: Value,
        handler: &H,
        session: &mut SessionInfo,
    ) -> Result<(), serde_json::Error> {
        match event {
            "READY" => {
                let ready: Ready = serde_json::from_value(data)?;
                session.session_id = Some(ready.session_id);
                session.resume_url = ready.resume_gateway_url;
                self.state.set_bot_tag(ready.user.tag());
                self.state.set_ready(true);
                info!(
                    bot = %ready.user.tag(),
                    bot_id = %ready.user.id,
                    guilds = ready.guilds.len(),
                    "Gateway session ready"
                );
            }
            "RESUMED" => {
                self.state.set_ready(true);
                info!(sequence = ?session.sequence, "Gateway session resumed");
            }
            "GUILD_CREATE" | "GUILD_UPDATE" => {
                let guild: Guild = serde_json::from_value(data)?;
                if let Some(name) = guild.name {
                    if event == "GUILD_CREATE" {
                        info!(
                            guild_id = %guild.id,
                            guild_name = %name,
                            member_count = ?guild.member_count,
                            "Guild available"
                        );
                    }
                    let member_count = guild
                        .member_count
                        .or_else(|| self.state.guild(&guild.id).and_then(|g| g.member_count));
                    self.state.upsert_guild(&guild.id, GuildInfo { name, member_count });
                }
            }
            "GUILD_DELETE" => {
                let guild: Guild = serde_json::from_value(data)?;
                if guild.unavailable == Some(true) {
                    warn!(guild_id = %guild.id, "Guild became unavailable");
                } else if let Some(info) = self.state.remove_guild(&guild.id) {
                    info!(guild_id = %guild.id, guild_name = %info.name, "Removed from guild");
                }
            }
            "GUILD_MEMBER_ADD" => {
                let add: GuildMemberAdd = serde_json::from_value(data)?;
                let guild_name = self.state.guild_name(&add.guild_id);
                match add.into_member_record(guild_name) {
                    Some(member) => handler.on_member_join(member),
                    None => warn!("GUILD_MEMBER_ADD without user object"),
                }
            }
            other => trace!(event = other, "Ignoring dispatch"),
        }
        Ok(())
    }

    fn identify_payload(&self) -> Value {
        json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": RELAY_INTENTS,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": env!("CARGO_PKG_NAME"),
                    "device": env!("CARGO_PKG_NAME"),
                },
            },
        })
    }

    fn resume_payload(&self, session: &SessionInfo) -> Value {
        json!({
            "op": opcode::RESUME,
            "d": {
                "token": self.token,
                "session_id": session.session_id,
                "seq": session.sequence,
            },
        })
    }
}

fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": sequence })
}
