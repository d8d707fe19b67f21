//! Streaming response bodies.
//!
//! Files go out in fixed-size chunks. The delivery receipt is committed
//! once the stream is polled past its last chunk, i.e. after every byte has
//! been handed to the transport; an errored or dropped stream never commits.

use std::io;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bootgrid_provision::{Delivery, Payload, Receipt};
use bytes::Bytes;
use futures_util::stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{error, warn};

/// Read size for raw artifacts.
pub const CHUNK_SIZE: usize = 64 * 1024;

enum Source {
    Buffer(Option<Bytes>),
    File(File),
}

impl Source {
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        match self {
            Source::Buffer(buf) => Ok(buf.take()),
            Source::File(file) => {
                let mut buf = vec![0u8; CHUNK_SIZE];
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
        }
    }
}

/// Build the `200 OK` response for a delivery.
pub async fn respond(delivery: Delivery) -> Response {
    let Delivery { payload, receipt } = delivery;
    let content_type = payload.content_type();
    let content_length = payload.content_length();

    let source = match payload {
        Payload::Rendered { body, .. } => Source::Buffer(Some(Bytes::from(body))),
        Payload::File { path, .. } => match open(path).await {
            Ok(file) => Source::File(file),
            Err(status) => return status.into_response(),
        },
    };

    let body = Body::from_stream(stream::unfold(
        Some((source, receipt)),
        |state| async move {
            let Some((mut source, receipt)) = state else {
                return None;
            };
            match source.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some((source, receipt)))),
                Ok(None) => {
                    commit(receipt).await;
                    None
                }
                Err(err) => {
                    warn!(%err, "artifact read failed mid-stream");
                    Some((Err(err), None))
                }
            }
        },
    ));

    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, content_length.to_string()),
        ],
        body,
    )
        .into_response()
}

/// The file was checked during negotiation; losing it now is a race with
/// whoever replaced it.
async fn open(path: PathBuf) -> Result<File, StatusCode> {
    File::open(&path).await.map_err(|err| {
        error!(path = ?path, %err, "artifact vanished before streaming");
        match err.kind() {
            io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    })
}

/// Status sinks may block on disk.
async fn commit(receipt: Receipt) {
    if let Err(err) = tokio::task::spawn_blocking(move || receipt.commit()).await {
        error!(%err, "status commit task failed");
    }
}
