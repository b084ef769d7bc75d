use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

use climate_common::{AttemptId, ConnectionEvent};

use crate::host::KioskEvent;

/// Opens one WebSocket for `attempt` and pumps it until it closes or the
/// host drops the outbound sender. Every outcome is reported as an event.
pub fn spawn_transport(
    url: String,
    attempt: AttemptId,
    events: mpsc::UnboundedSender<KioskEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(err) => {
                let _ = events.send(KioskEvent::Connection(ConnectionEvent::Failed {
                    attempt,
                    reason: format!("connect to {url} failed: {err}"),
                }));
                return;
            }
        };

        let (mut sink, mut reader) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        if events
            .send(KioskEvent::TransportOpened {
                attempt,
                outbound: outbound_tx,
            })
            .is_err()
        {
            return;
        }

        let outcome = loop {
            tokio::select! {
                outbound = outbound_rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            break ConnectionEvent::Failed {
                                attempt,
                                reason: format!("send failed: {err}"),
                            };
                        }
                    }
                    None => {
                        debug!(attempt, "closing websocket on request");
                        let _ = sink.close().await;
                        return;
                    }
                },
                inbound = reader.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if events
                            .send(KioskEvent::Connection(ConnectionEvent::Frame { attempt, text }))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break ConnectionEvent::Closed {
                            attempt,
                            reason: frame
                                .map(|frame| format!("closed by server ({}): {}", frame.code, frame.reason)),
                        };
                    }
                    Some(Ok(other)) => {
                        debug!(attempt, "ignoring non-text frame: {other:?}");
                    }
                    Some(Err(err)) => {
                        break ConnectionEvent::Failed {
                            attempt,
                            reason: format!("websocket error: {err}"),
                        };
                    }
                    None => break ConnectionEvent::Closed { attempt, reason: None },
                },
            }
        };

        let _ = events.send(KioskEvent::Connection(outcome));
    })
}

/// The chart server speaks plain HTTP; derive it from the socket URL when
/// it is not configured separately.
pub fn http_base_from_ws(ws_url: &str) -> Option<String> {
    let mut url = Url::parse(ws_url).ok()?;
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    url.set_username("").ok()?;
    url.set_password(None).ok()?;
    url.set_path("");
    url.set_query(None);
    url.set_fragment(None);
    Some(url.as_str().trim_end_matches('/').to_string())
}
