//! WebSocket connector
//!
//! Frames travel as JSON text messages. The auth token is sent once, as a
//! bearer `Authorization` header on the upgrade request.

use super::{Connector, Frame, Link, LinkSignal};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Connects to the realtime backend over WebSocket
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| Error::InvalidConfig(format!("invalid socket url {url}: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self::new(url)),
            other => Err(Error::InvalidConfig(format!(
                "socket url must use ws or wss, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self, auth_token), fields(url = %self.url))]
    async fn open(&self, auth_token: Option<&str>) -> Result<Link> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InvalidConfig(format!("auth token is not a valid header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _response) = connect_async(request).await?;
        let (mut sink, mut source) = socket.split();
        let connection_id = Uuid::new_v4().to_string();
        info!(connection_id = %connection_id, "WebSocket opened");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkSignal>();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(event = %frame.event, error = %e, "Skipping unserializable frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(text.as_str()) {
                        Ok(frame) => {
                            if in_tx.send(LinkSignal::Frame(frame)).is_err() {
                                return;
                            }
                        }
                        Err(e) => debug!(error = %e, "Ignoring malformed frame"),
                    },
                    Ok(Message::Close(close)) => {
                        let reason = close
                            .map(|c| c.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "server closed".to_string());
                        let _ = in_tx.send(LinkSignal::Closed { reason });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(LinkSignal::Error(e.to_string()));
                        let _ = in_tx.send(LinkSignal::Closed {
                            reason: "socket error".to_string(),
                        });
                        return;
                    }
                }
            }
            let _ = in_tx.send(LinkSignal::Closed {
                reason: "socket closed".to_string(),
            });
        });

        Ok(Link {
            connection_id,
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
