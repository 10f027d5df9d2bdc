use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::hub::Relay;
use super::session::Session;
use crate::bridge::{SharedBridge, lock_bridge};

/// Binds `addr` and serves browser sessions until the task is dropped.
pub async fn start_websocket_server(
    addr: &str,
    bridge: SharedBridge,
    relay: Arc<Relay>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("WebSocket server listening on ws://{}", listener.local_addr()?);

    serve(listener, bridge, relay).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, bridge: SharedBridge, relay: Arc<Relay>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                spawn(handle_connection(stream, peer, bridge.clone(), relay.clone()));
            }
            Err(e) => warn!("Failed to accept connection: {e}"),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bridge: SharedBridge,
    relay: Arc<Relay>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error from {peer}: {e}");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Create channel for this session
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let session = Session::new(tx);
    let session_id = session.id.clone();

    // Snapshot and registration happen under the bridge lock, so no status
    // change can fall between them.
    let joined = {
        let bridge = lock_bridge(&bridge);
        relay.join(session, &bridge.connection_status())
    };
    if let Err(e) = joined {
        warn!("{session_id} from {peer} could not join: {e}");
        return;
    }

    // Forward relay events → browser
    let writer_id = session_id.clone();
    let writer = spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                debug!("Failed to send message to {writer_id}: {e}");
                break;
            }
        }
        debug!("Send loop closed for {writer_id}");
    });

    // The push channel is one-way; client frames are drained and ignored.
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Text(_)) | Ok(WsMessage::Binary(_)) => {
                debug!("Ignoring client frame from {session_id}");
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Read error on {session_id}: {e}");
                break;
            }
        }
    }

    relay.leave(&session_id);
    let _ = writer.await;
    info!("{session_id} disconnected");
}
