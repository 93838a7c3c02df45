//! Duplex channel transport for the signaling connection
//!
//! The connection manager speaks to the network through the [`Transport`]
//! trait so the production WebSocket implementation and test doubles are
//! interchangeable. All WebSocket consumers in the crate go through
//! [`WebSocketTransport`] rather than `tokio-tungstenite` directly; by
//! centralizing the connection logic, future enhancements (TLS config,
//! proxy support, metrics) apply everywhere at once.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::error::{ClientError, ClientResult};

/// Concrete WebSocket stream type
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A message received from the channel
#[derive(Debug, Clone)]
pub enum TransportMessage {
    /// UTF-8 text frame
    Text(String),
    /// Ping frame with payload
    Ping(Vec<u8>),
    /// Pong frame with payload
    Pong(Vec<u8>),
    /// Close frame with status code and reason
    Close {
        /// Close code (1000 = normal, 1005 = no code)
        code: u16,
        /// Human-readable close reason
        reason: String,
    },
}

/// Write half of an established channel
#[async_trait]
pub trait MessageSink: Send {
    /// Send a UTF-8 text frame
    async fn send_text(&mut self, text: &str) -> ClientResult<()>;

    /// Send a pong frame in response to a ping
    async fn send_pong(&mut self, data: Vec<u8>) -> ClientResult<()>;

    /// Flush pending writes and close the channel
    async fn close(&mut self) -> ClientResult<()>;
}

/// Read half of an established channel
#[async_trait]
pub trait MessageStream: Send {
    /// Receive the next message, returning `None` when the stream ends
    async fn recv(&mut self) -> Option<ClientResult<TransportMessage>>;
}

/// Established channel as a (writer, reader) pair for independent use in
/// `tokio::select!` loops
pub type TransportPair = (Box<dyn MessageSink>, Box<dyn MessageStream>);

/// Dials the signaling endpoint
///
/// Implementations authenticate with the bearer credential and return the
/// split channel halves. Credential rejection must surface as
/// [`ClientError::AuthenticationFailed`] so the connection manager can stop
/// retrying and hand the problem to the auth collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str, bearer_token: &str) -> ClientResult<TransportPair>;
}

/// Convert an HTTP(S) URL to WS(S) scheme, passing `ws://`/`wss://` through
pub fn ws_scheme_url(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://").replace("http://", "ws://")
    }
}

/// Production transport on `tokio-tungstenite`
#[derive(Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str, bearer_token: &str) -> ClientResult<TransportPair> {
        use tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::InvalidConfiguration {
                field: "server_url".to_string(),
                reason: format!("invalid WebSocket URL {url}: {e}"),
            })?;

        let bearer = format!("Bearer {bearer_token}");
        let auth_value = tungstenite::http::HeaderValue::from_str(&bearer).map_err(|e| {
            ClientError::authentication_failed(format!("credential is not a valid header: {e}"))
        })?;
        request
            .headers_mut()
            .insert(tungstenite::http::header::AUTHORIZATION, auth_value);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(classify_handshake_error)?;

        let (sink, stream) = ws_stream.split();

        Ok((
            Box::new(WsSink { sink }),
            Box::new(WsReader { stream }),
        ))
    }
}

/// Map a handshake failure onto the client error taxonomy
///
/// 401/403 responses mean the credential was rejected; everything else is
/// a transient network condition subject to the reconnect policy.
fn classify_handshake_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == tungstenite::http::StatusCode::UNAUTHORIZED
                || status == tungstenite::http::StatusCode::FORBIDDEN
            {
                ClientError::authentication_failed(format!("handshake rejected: {status}"))
            } else {
                ClientError::network_error(format!("handshake failed: {status}"))
            }
        }
        other => ClientError::network_error(format!("WebSocket connect failed: {other}")),
    }
}

struct WsSink {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send_text(&mut self, text: &str) -> ClientResult<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .map_err(|e| ClientError::network_error(format!("send failed: {e}")))
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> ClientResult<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| ClientError::network_error(format!("pong failed: {e}")))
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.sink
            .close()
            .await
            .map_err(|e| ClientError::network_error(format!("close failed: {e}")))
    }
}

struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl MessageStream for WsReader {
    async fn recv(&mut self) -> Option<ClientResult<TransportMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(TransportMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(_))) => {
                    // The signaling protocol is text-only
                    continue;
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(TransportMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(TransportMessage::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(TransportMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames -- skip
                    continue;
                }
                Some(Err(e)) => {
                    return Some(Err(ClientError::network_error(format!("read error: {e}"))));
                }
                None => return None,
            }
        }
    }
}
