use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};

use crate::{CommsErr, Frame, FrameSender, Result};

type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// The coordinator-side end of a worker channel.
///
/// Owns the write half directly and pumps the read half through a
/// background task into a queue, so that waiting for a frame can be
/// bounded by a timeout without losing partially read data.
///
/// A channel is exclusively owned by one handle/worker pair and is never
/// shared or multiplexed.
pub struct Channel {
    tx: FrameSender<BoxWrite>,
    rx: mpsc::UnboundedReceiver<Result<Frame>>,
    peeked: VecDeque<Frame>,
    pump: JoinHandle<()>,
}

impl Channel {
    /// Creates a new `Channel` over the given stream halves.
    ///
    /// Must be called from within a tokio runtime; the read half is moved
    /// into a background pump task.
    ///
    /// # Arguments
    /// * `rx` - The readable half connected to the worker's output.
    /// * `tx` - The writable half connected to the worker's input.
    pub fn new<R, W>(rx: R, tx: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (mut frames, sender) = crate::channel(
            Box::new(rx) as Box<dyn AsyncRead + Send + Unpin>,
            Box::new(tx) as BoxWrite,
        );

        let pump = tokio::spawn(async move {
            loop {
                match frames.recv_frame().await {
                    Ok(frame) => {
                        if frames_tx.send(Ok(frame)).is_err() {
                            break;
                        }
                    }
                    Err(CommsErr::ChannelDeath) => break,
                    Err(e) => {
                        let _ = frames_tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Self {
            tx: sender,
            rx: frames_rx,
            peeked: VecDeque::new(),
            pump,
        }
    }

    /// Sends a control value to the worker.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        self.tx.send(msg).await
    }

    /// Sends a raw byte payload to the worker.
    pub async fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.tx.send_bytes(data).await
    }

    /// Waits for the next frame.
    ///
    /// # Returns
    /// The frame, or `CommsErr::ChannelDeath` once the peer is gone and
    /// all buffered frames were drained.
    pub async fn recv(&mut self) -> Result<Frame> {
        if let Some(frame) = self.peeked.pop_front() {
            return Ok(frame);
        }
        match self.rx.recv().await {
            Some(res) => res,
            None => Err(CommsErr::ChannelDeath),
        }
    }

    /// Waits for a control frame and decodes it into `T`.
    pub async fn recv_control<T: DeserializeOwned>(&mut self) -> Result<T> {
        match self.recv().await? {
            Frame::Control(payload) => Ok(serde_json::from_slice(&payload)?),
            other => Err(CommsErr::Protocol {
                expected: "control frame",
                got: other.kind().to_string(),
            }),
        }
    }

    /// Waits for a raw byte payload frame.
    pub async fn recv_bytes(&mut self) -> Result<Vec<u8>> {
        match self.recv().await? {
            Frame::Bytes(payload) => Ok(payload),
            other => Err(CommsErr::Protocol {
                expected: "bytes frame",
                got: other.kind().to_string(),
            }),
        }
    }

    /// Checks whether a frame is available, waiting at most `wait`.
    ///
    /// A `true` result guarantees the next `recv` returns immediately.
    ///
    /// # Returns
    /// Whether a frame is buffered, or `CommsErr::ChannelDeath` if the
    /// peer is gone.
    pub async fn poll(&mut self, wait: Duration) -> Result<bool> {
        if !self.peeked.is_empty() {
            return Ok(true);
        }
        match timeout(wait, self.rx.recv()).await {
            Err(_) => Ok(false),
            Ok(None) => Err(CommsErr::ChannelDeath),
            Ok(Some(Ok(frame))) => {
                self.peeked.push_back(frame);
                Ok(true)
            }
            Ok(Some(Err(e))) => Err(e),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
