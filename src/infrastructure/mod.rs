//! Infrastructure layer - broker, stores, notifiers and fetchers

pub mod fetchers;
pub mod notify;
pub mod redis_link;
pub mod store;
pub mod transport;

#[cfg(test)]
mod redis_fake;
