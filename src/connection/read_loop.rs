//! Inbound half of a session: decode frames and route replies.

use std::sync::Arc;

use futures::StreamExt;
use log::debug;
use tokio::io::AsyncRead;
use tokio_util::{codec::FramedRead, sync::CancellationToken};

use super::Shared;
use crate::{
    error::TransportError,
    frame::{Frame, FrameCodec},
};

/// Read frames until cancelled or until the session faults.
///
/// Any decode failure, unknown correlation id, or peer EOF ends the session
/// and fails every pending request with that error.
pub(super) async fn run<R>(
    shared: Arc<Shared>,
    mut frames: FramedRead<R, FrameCodec>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let fault = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break None,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                if let Err(error) = dispatch(&shared, frame) {
                    break Some(error);
                }
            }
            Some(Err(error)) => {
                if matches!(
                    error,
                    TransportError::CorruptHeader { .. } | TransportError::Truncated { .. }
                ) {
                    shared.probe.header_corrupted();
                }
                break Some(error);
            }
            None => break Some(TransportError::PeerClosed),
        }
    };
    shared.probe.connection_closed();
    match fault {
        Some(error) => shared.fault(&error, &cancel),
        None => debug!("read loop cancelled"),
    }
}

fn dispatch(shared: &Shared, frame: Frame) -> Result<(), TransportError> {
    shared.probe.add_bytes_received(frame.wire_len());
    let id = frame.correlation_id;
    if shared.table.complete(id, frame.payload) {
        shared.probe.request_completed();
        Ok(())
    } else {
        shared.probe.server_correlation_error();
        Err(TransportError::UnknownCorrelation { id })
    }
}
