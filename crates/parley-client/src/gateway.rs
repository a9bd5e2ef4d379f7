use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::events::{GatewayCommand, GatewayEvent};

use crate::error::ClientError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// An identified gateway session. Events arrive on the receiver returned
/// by `connect` until the server closes the socket or `disconnect` is called.
pub struct GatewayClient {
    user_id: Uuid,
    sink: WsSink,
    reader: JoinHandle<()>,
}

impl GatewayClient {
    /// Open the socket, identify with `token`, and wait for `ready`.
    pub async fn connect(
        url: &str,
        token: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<GatewayEvent>), ClientError> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut sink, mut stream) = ws_stream.split();

        let identify = serde_json::to_string(&GatewayCommand::Identify {
            token: token.to_string(),
        })?;
        sink.send(Message::text(identify)).await?;

        // The first text frame must be Ready; a close means the token was refused
        let user_id = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                        Ok(GatewayEvent::Ready { user_id }) => break user_id,
                        _ => return Err(ClientError::AuthInvalid),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::AuthInvalid),
                Some(Ok(_)) => continue,
                // A socket dropped mid-handshake is a refusal too
                Some(Err(e)) => {
                    debug!("Gateway closed during handshake: {}", e);
                    return Err(ClientError::AuthInvalid);
                }
            }
        };
        info!("Gateway ready as {}", user_id);

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Unreadable gateway event: {}", e),
                    },
                    Message::Close(_) => break,
                    // tungstenite answers pings on the next read or write
                    _ => {}
                }
            }
            debug!("Gateway reader finished");
        });

        Ok((Self { user_id, sink, reader }, rx))
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Tell the server we are leaving and close the socket.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        let frame = serde_json::to_string(&GatewayCommand::Disconnect)?;
        let result = async {
            self.sink.send(Message::text(frame)).await?;
            self.sink.close().await
        }
        .await;
        self.reader.abort();
        result.map_err(ClientError::from)
    }
}
