//! The implementation of the sending end of the channel protocol.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    CommsErr, LenType, Result,
    frame::{self, Frame},
};

/// The sending end handle of the communication.
pub struct FrameSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    /// Creates a new `FrameSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(crate) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` as a control frame.
    ///
    /// # Arguments
    /// * `msg` - A serializable protocol value.
    ///
    /// # Returns
    /// A result object that returns `CommsErr` on failure.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.write_frame(frame::CONTROL_H, &payload).await
    }

    /// Sends a raw byte payload frame, avoiding any value encoding.
    ///
    /// # Arguments
    /// * `data` - The raw payload (parameter or batch buffer).
    pub async fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(frame::BYTES_H, data).await
    }

    /// Sends a failure detail frame.
    ///
    /// # Arguments
    /// * `detail` - Human readable failure description.
    pub async fn send_err(&mut self, detail: &str) -> Result<()> {
        self.write_frame(frame::ERR_H, detail.as_bytes()).await
    }

    /// Sends an already assembled frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frame(frame.header(), frame.payload()).await
    }

    async fn write_frame(&mut self, header: u32, payload: &[u8]) -> Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        let len = (frame::HEADER_SIZE + payload.len()) as LenType;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&header.to_be_bytes());

        tx.write_all(buf).await.map_err(CommsErr::from)?;
        tx.write_all(payload).await.map_err(CommsErr::from)?;
        tx.flush().await.map_err(CommsErr::from)
    }
}
