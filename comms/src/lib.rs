mod channel;
mod error;
mod frame;
mod receiver;
mod sender;
pub mod specs;
pub mod transport;

use tokio::io::{AsyncRead, AsyncWrite};

pub use channel::Channel;
pub use error::CommsErr;
pub use frame::Frame;
pub use receiver::FrameReceiver;
pub use sender::FrameSender;

/// The comms module's result type.
pub type Result<T> = std::result::Result<T, CommsErr>;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Creates both `FrameReceiver` and `FrameSender` channel parts.
///
/// Given a reader and writer creates and returns both ends of the
/// communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a frame receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (FrameReceiver<R>, FrameSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (FrameReceiver::new(rx), FrameSender::new(tx))
}
