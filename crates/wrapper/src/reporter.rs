//! Callback delivery to the daemon over the control WebSocket.
//!
//! Every callback is a sequenced envelope; delivery is at-least-once.
//! The daemon acks each frame, treats a redelivered sequence as `Stale`,
//! and both count as delivered here. The connection is re-dialled with
//! a fixed delay whenever it drops.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gridexec_core::types::JobId;
use gridexec_proto::{Envelope, ErrorCode, Reply, Request};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Reconnection delay after a WebSocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Delivery attempts for messages that must not be lost (the terminal
/// callback). 60 tries at 5s covers a five-minute daemon outage.
const PERSISTENT_RETRY_LIMIT: u32 = 60;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of a delivery attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The daemon applied (or had already applied) the callback.
    Accepted,
    /// The daemon refused the callback permanently; stop reporting.
    Refused,
    /// The daemon could not be reached within the retry budget.
    Undeliverable,
}

/// Sequenced callback channel for one job attempt.
pub struct Reporter {
    url: String,
    job_id: JobId,
    seq: i64,
    conn: Option<WsStream>,
}

impl Reporter {
    pub fn new(url: impl Into<String>, job_id: JobId) -> Self {
        Self {
            url: url.into(),
            job_id,
            seq: 0,
            conn: None,
        }
    }

    /// Send a callback once, reconnecting at most once on a transport
    /// failure. Used for heartbeats, which the next tick supersedes.
    pub async fn send(&mut self, body: Request) -> Delivery {
        self.deliver(body, 1).await
    }

    /// Send a callback that must arrive, retrying across reconnects.
    pub async fn send_persistent(&mut self, body: Request) -> Delivery {
        self.deliver(body, PERSISTENT_RETRY_LIMIT).await
    }

    async fn deliver(&mut self, body: Request, tries: u32) -> Delivery {
        self.seq += 1;
        let envelope = Envelope::callback(self.job_id, self.seq, body);
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Envelope serialization failed");
                return Delivery::Refused;
            }
        };

        for attempt in 1..=tries {
            if attempt > 1 {
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            match self.round_trip(&json).await {
                Ok(reply) => return classify_reply(reply),
                Err(e) => {
                    tracing::warn!(
                        seq = self.seq,
                        attempt,
                        error = %e,
                        "Callback delivery failed",
                    );
                    self.conn = None;
                }
            }
        }
        Delivery::Undeliverable
    }

    /// One request/reply exchange on the (re)established connection.
    async fn round_trip(
        &mut self,
        json: &str,
    ) -> Result<Reply, tokio_tungstenite::tungstenite::Error> {
        if self.conn.is_none() {
            tracing::debug!(url = %self.url, "Dialling daemon");
            let (stream, _response) = connect_async(self.url.as_str()).await?;
            self.conn = Some(stream);
        }
        let conn = self.conn.as_mut().expect("connection just established");

        conn.send(Message::Text(json.to_string())).await?;

        // Skip control frames until the text reply arrives.
        while let Some(frame) = conn.next().await {
            match frame? {
                Message::Text(text) => {
                    return Ok(serde_json::from_str(&text).unwrap_or(Reply::Error {
                        code: ErrorCode::Internal,
                        message: format!("Unparseable reply: {text}"),
                    }));
                }
                Message::Close(_) => {
                    return Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed);
                }
                _ => {}
            }
        }
        Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
    }
}

/// Map the daemon's reply onto a delivery outcome.
fn classify_reply(reply: Reply) -> Delivery {
    match reply {
        Reply::Ok | Reply::Stale => Delivery::Accepted,
        Reply::Error { code, message } => {
            tracing::warn!(code = ?code, message = %message, "Daemon refused callback");
            Delivery::Refused
        }
        other => {
            tracing::warn!(reply = ?other, "Unexpected reply to callback");
            Delivery::Refused
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_and_stale_count_as_accepted() {
        assert_eq!(classify_reply(Reply::Ok), Delivery::Accepted);
        assert_eq!(classify_reply(Reply::Stale), Delivery::Accepted);
    }

    #[test]
    fn errors_are_refused() {
        let reply = Reply::Error {
            code: ErrorCode::AlreadyTerminal,
            message: "Job 3 already reached a terminal state".into(),
        };
        assert_eq!(classify_reply(reply), Delivery::Refused);
    }
}
