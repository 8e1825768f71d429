//! Queue broker adapters.

pub mod http;
pub mod memory;

pub use http::HttpQueueBroker;
pub use memory::InMemoryBroker;
