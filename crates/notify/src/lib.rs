//! Notification side-effect port.
//!
//! The order workflow informs staff over publish/subscribe topics and
//! students over point-to-point device pushes. Delivery is best effort:
//! callers log failures and never unwind committed work because of them.

pub mod broadcast;
pub mod dispatcher;
pub mod error;
pub mod recording;

pub use broadcast::{BroadcastNotifier, DevicePush, StaffEvent};
pub use dispatcher::{NotificationDispatcher, PushMessage, StaffTopic};
pub use error::{NotifyError, Result};
pub use recording::RecordingNotifier;
