use crate::client::context::HotRuntime;
use crate::core::protocol::HmrPayload;
use crate::utils::{Logger, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Drive `runtime` from the HMR channel at `url` until either side closes.
///
/// Frames are handled one at a time, so an update batch finishes before the
/// next message is looked at.
pub async fn connect(
    url: &str,
    runtime: Arc<HotRuntime>,
    mut upstream: mpsc::UnboundedReceiver<HmrPayload>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(url).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    Logger::info(&format!("🔌 Connected to {}", url));

    let mut upstream_open = true;
    loop {
        tokio::select! {
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => runtime.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            outgoing = upstream.recv(), if upstream_open => match outgoing {
                Some(payload) => {
                    let text = serde_json::to_string(&payload)?;
                    ws_sender.send(Message::Text(text)).await?;
                }
                None => upstream_open = false,
            },
        }
    }

    Logger::info("🔌 HMR channel closed");
    Ok(())
}
