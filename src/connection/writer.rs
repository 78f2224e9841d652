//! Outbound half of a session: the single writer task.
//!
//! Requests are written in the order they were queued, one write in flight
//! at a time. Frames that are already queued when the task wakes are fed
//! into the sink together and flushed once.

use std::{sync::Arc, time::Duration};

use futures::SinkExt;
use log::debug;
use tokio::{io::AsyncWrite, sync::mpsc, time::timeout};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};

use super::Shared;
use crate::{
    error::TransportError,
    frame::{Frame, FrameCodec},
};

/// Upper bound on flushing and shutting down the write half on stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) async fn run<W>(
    shared: Arc<Shared>,
    mut sink: FramedWrite<W, FrameCodec>,
    mut queue: mpsc::UnboundedReceiver<Frame>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            written = write_batch(&mut sink, &mut queue, first) => written,
        };
        match written {
            Ok((frames, bytes)) => {
                for _ in 0..frames {
                    shared.probe.request_sent();
                }
                shared.probe.add_bytes_sent(bytes);
            }
            Err(error) => {
                shared.fault(&error, &cancel);
                return;
            }
        }
    }
    queue.close();
    match timeout(SHUTDOWN_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => debug!("write half closed"),
        Ok(Err(error)) => debug!("failed to close write half: {error}"),
        Err(_) => debug!("timed out closing write half"),
    }
}

/// Feed `first` and every frame already queued behind it, then flush.
///
/// Returns the number of frames and bytes written.
async fn write_batch<W>(
    sink: &mut FramedWrite<W, FrameCodec>,
    queue: &mut mpsc::UnboundedReceiver<Frame>,
    first: Frame,
) -> Result<(usize, usize), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = 1;
    let mut bytes = first.wire_len();
    sink.feed(first).await?;
    while let Ok(frame) = queue.try_recv() {
        frames += 1;
        bytes += frame.wire_len();
        sink.feed(frame).await?;
    }
    sink.flush().await?;
    Ok((frames, bytes))
}
