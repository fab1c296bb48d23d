pub mod discord;
pub mod format;
pub mod notifier;
pub mod sink;

pub use discord::DiscordWebhookSink;
pub use format::format_coupon_message;
pub use notifier::{NotifyReport, Notifier};
pub use sink::{DeliveryError, MessageSink};
