//! The implementation of the receiving end of the channel protocol.

use std::io;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    CommsErr, LEN_TYPE_SIZE, LenType, Result,
    frame::{self, Frame},
};

/// The receiving end handle of the communication.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    /// Creates a new `FrameReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(crate) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Waits to receive the next frame from the peer.
    ///
    /// # Returns
    /// The next frame, `CommsErr::ChannelDeath` if the peer closed the
    /// stream at a frame boundary, or another `CommsErr` on failure.
    /// End-of-stream in the middle of a frame is a protocol violation,
    /// not a death condition.
    pub async fn recv_frame(&mut self) -> Result<Frame> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        if let Err(e) = self.rx.read_exact(&mut size_buf).await {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Err(CommsErr::ChannelDeath);
            }
            return Err(e.into());
        }
        let len = LenType::from_be_bytes(size_buf) as usize;

        if len < frame::HEADER_SIZE {
            return Err(CommsErr::Protocol {
                expected: "frame header",
                got: format!("frame of {len} bytes"),
            });
        }

        let mut header_buf = [0; frame::HEADER_SIZE];
        self.read_body(&mut header_buf).await?;
        let header = u32::from_be_bytes(header_buf);

        let mut payload = vec![0; len - frame::HEADER_SIZE];
        self.read_body(&mut payload).await?;

        match header {
            frame::ERR_H => {
                let detail = String::from_utf8(payload).map_err(|e| CommsErr::Protocol {
                    expected: "utf-8 err frame",
                    got: e.to_string(),
                })?;
                Ok(Frame::Err(detail))
            }
            frame::CONTROL_H => Ok(Frame::Control(payload)),
            frame::BYTES_H => Ok(Frame::Bytes(payload)),
            byte => Err(CommsErr::Protocol {
                expected: "known frame kind",
                got: format!("kind header {byte}"),
            }),
        }
    }

    /// Waits for a control frame and decodes it into `T`.
    ///
    /// Any other frame kind is a protocol violation.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        match self.recv_frame().await? {
            Frame::Control(payload) => Ok(serde_json::from_slice(&payload)?),
            other => Err(CommsErr::Protocol {
                expected: "control frame",
                got: other.kind().to_string(),
            }),
        }
    }

    /// Waits for a raw byte payload frame.
    ///
    /// Any other frame kind is a protocol violation.
    pub async fn recv_bytes(&mut self) -> Result<Vec<u8>> {
        match self.recv_frame().await? {
            Frame::Bytes(payload) => Ok(payload),
            other => Err(CommsErr::Protocol {
                expected: "bytes frame",
                got: other.kind().to_string(),
            }),
        }
    }

    async fn read_body(&mut self, buf: &mut [u8]) -> Result<()> {
        self.rx.read_exact(buf).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                CommsErr::Protocol {
                    expected: "complete frame",
                    got: "eof mid-frame".to_string(),
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }
}
