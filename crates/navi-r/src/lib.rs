pub mod channel;

pub use channel::{ChannelError, EventChannel, parse_frame};
