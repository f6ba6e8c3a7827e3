//! Notification channel implementations

mod log;
mod twilio;

pub use self::log::LogNotifier;
pub use twilio::{TwilioConfig, TwilioNotifier};
