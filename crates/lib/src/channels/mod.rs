//! Communication channels (Telegram).
//!
//! The channel handle trait lets the coordinator reply and show typing without knowing the
//! transport. Inbound messages are pushed onto the gateway's queue for dispatch.

mod handle;
mod inbound;
mod telegram;

pub use handle::{ChannelError, ChannelHandle};
pub use inbound::{InboundKind, InboundMessage, UNKNOWN_USERNAME};
pub use telegram::{TelegramChannel, TelegramUpdate};
