use super::ProcessHandle;
use crate::events::Output;

use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Size of a single read from a child stream.
const CHUNK_SIZE: usize = 32 * 1024;

/// How long the stdout pump waits for the exit status after stdout closes.
/// A child that closes stdout and keeps running is reported as still running.
const EXIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn wrap(self, blob: Bytes) -> Output {
        match self {
            Stream::Stdout => Output::Stdout(blob),
            Stream::Stderr => Output::Stderr(blob),
        }
    }
}

/// Drains one child stream on its own task so the child never blocks on a
/// full pipe.
pub struct StreamPump;

impl StreamPump {
    pub fn spawn<R>(handle: Arc<ProcessHandle>, reader: R, stream: Stream)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(Self::run(handle, reader, stream));
    }

    async fn run<R>(handle: Arc<ProcessHandle>, mut reader: R, stream: Stream)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(n) if n > 0 => {
                    // keep draining after a kill, the bytes just go nowhere
                    if let Some(listener) = handle.listener() {
                        let blob = Bytes::copy_from_slice(&buf[..n]);
                        listener.on_data(&handle, stream.wrap(blob));
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    debug!(job_id = %handle.id(), ?stream, error = %e, "read failed, closing stream");
                    break;
                }
            }
        }
        drop(reader);
        debug!(job_id = %handle.id(), ?stream, "stream closed");

        if stream == Stream::Stdout {
            let _ = tokio::time::timeout(EXIT_GRACE, handle.wait()).await;
            if let Some(listener) = handle.listener() {
                listener.on_finished(&handle);
            }
        }
    }
}
