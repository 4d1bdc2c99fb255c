//! Live leak notifications for Tripwire.
//!
//! A [`NotificationChannel`] dials the notification service over QUIC,
//! registers the client, then appends every inbound frame to a shared
//! [`NotificationLog`] from a single spawned task.

pub mod channel;
pub mod error;
pub mod log;
pub mod notification;

pub use channel::{
    ALPN, ChannelState, CloseReason, MAX_FRAME_LENGTH, NotificationChannel, NotificationSession,
    frame_codec, load_root_certificates,
};
pub use error::{ChannelError, ChannelResult};
pub use log::NotificationLog;
pub use notification::Notification;
