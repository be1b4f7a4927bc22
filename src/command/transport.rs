use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CommandDispatcher, FrameCodec};

/// Read framed commands from `reader` and run them one at a time until the
/// input ends or shutdown begins. Query replies are written to `writer`.
pub async fn serve_frames<R, W>(
    reader: R,
    writer: W,
    dispatcher: CommandDispatcher,
    shutdown: CancellationToken,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, FrameCodec::new());
    let mut replies = FramedWrite::new(writer, FrameCodec::new());
    info!("command transport listening");

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else {
            debug!("command input closed");
            break;
        };
        let payload = frame?;
        match dispatcher.dispatch(&payload).await {
            Ok(ack) => {
                if let Some(reply) = ack.reply_payload() {
                    replies.send(reply).await?;
                }
            }
            Err(e) => debug!(error = %e, %payload, "no reply for failed command"),
        }
    }

    if let Err(e) = replies.close().await {
        warn!(error = %e, "failed to flush command replies");
    }
    info!("command transport stopped");
    Ok(())
}
