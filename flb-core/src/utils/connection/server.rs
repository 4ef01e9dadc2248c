//! Operator endpoint.
//!
//! One WebSocket route, `/ws`. Text and binary frames both carry a single
//! `[x,y,r,a,e]` record; every record is decoded and published to the intent
//! slot, where the control loop finds it on its next tick. Publishing never
//! waits, and a dropped connection ends only its own handler.

use embassy_net::Stack;
use embassy_time::Duration;
use picoserve::{
    io::embedded_io_async as embedded_aio,
    response::ws::{Message, ReadMessageError, SocketRx, SocketTx, WebSocketCallback, WebSocketUpgrade},
    routing::get,
    Router,
};

use crate::utils::{
    connection::protocol::{decode_bytes_or_neutral, decode_or_neutral},
    controllers::intent,
};

/// Path the operator client connects to.
pub const WS_PATH: &str = "/ws";

/// Largest frame accepted from the operator.
const FRAME_LEN: usize = 256;

/// Feeds operator records into the intent slot.
pub struct IntentFeed;

impl WebSocketCallback for IntentFeed {
    async fn run<Reader, Writer>(
        self,
        mut rx: SocketRx<Reader>,
        mut tx: SocketTx<Writer>,
    ) -> Result<(), Writer::Error>
    where
        Reader: embedded_aio::Read,
        Writer: embedded_aio::Write<Error = Reader::Error>,
    {
        let mut frame = [0; FRAME_LEN];
        let mut records: u32 = 0;

        tx.send_text("Connected").await?;
        tracing::info!("operator connected");

        let reason = loop {
            let message = match rx.next_message(&mut frame).await {
                Ok(message) => message,
                Err(ReadMessageError::Io(err)) => {
                    tracing::error!(records, "operator link failed");
                    return Err(err);
                }
                Err(error) => {
                    tracing::warn!(?error, "bad frame from operator");
                    let code = match error {
                        ReadMessageError::TextIsNotUtf8 => 1007,
                        ReadMessageError::ReservedOpcode(_) => 1003,
                        _ => 1002,
                    };
                    break Some((code, "bad frame"));
                }
            };

            match message {
                Message::Text(text) => intent::publish(decode_or_neutral(text)),
                Message::Binary(bytes) => intent::publish(decode_bytes_or_neutral(bytes)),
                Message::Ping(data) => {
                    tx.send_pong(data).await?;
                    continue;
                }
                Message::Pong(_) => continue,
                Message::Close(reason) => {
                    tracing::info!(?reason, "operator closed the connection");
                    break None;
                }
            }
            records = records.wrapping_add(1);
        };

        tracing::info!(records, "operator disconnected");
        tx.close(reason).await
    }
}

fn default_config() -> picoserve::Config<Duration> {
    picoserve::Config::new(picoserve::Timeouts {
        start_read_request: Some(Duration::from_secs(5)),
        persistent_start_read_request: None,
        read_request: Some(Duration::from_secs(1)),
        write: Some(Duration::from_secs(5)),
    })
}

/// Serve the operator endpoint on `port` forever.
///
/// `config` overrides the request timeouts; `None` uses a 5 s connect and
/// write timeout with no idle limit on an open socket.
pub async fn run(
    id: usize,
    port: u16,
    stack: Stack<'static>,
    config: Option<&'static picoserve::Config<Duration>>,
) -> ! {
    let fallback = default_config();
    let config = config.unwrap_or(&fallback);

    let app = Router::new().route(
        WS_PATH,
        get(|upgrade: WebSocketUpgrade| async move { upgrade.on_upgrade(IntentFeed) }),
    );

    match stack.config_v4() {
        Some(ip) => tracing::info!("operator endpoint at ws://{}:{}{}", ip.address.address(), port, WS_PATH),
        None => tracing::warn!(port, "operator endpoint starting without an IPv4 address"),
    }

    let (mut tcp_rx, mut tcp_tx, mut http) = ([0; 512], [0; 512], [0; 1024]);

    picoserve::listen_and_serve(id, &app, config, stack, port, &mut tcp_rx, &mut tcp_tx, &mut http)
        .await
}
