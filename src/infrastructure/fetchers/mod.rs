//! Price API fetchers feeding the transport

mod poller;
mod sources;

pub use poller::{PriceFetcher, PricePoller};
pub use sources::PriceSource;
