//! Correlation of replies and stream chunks to open exchanges
//!
//! The [`CorrelationTable`] owns every pending exchange. Entries are created
//! when a caller issues a request or stream and destroyed exactly once: on
//! resolution, on abort or timeout, or when the channel is lost.

pub mod exchange;
pub mod table;

pub use exchange::{ClosedExchange, Delivery, ExchangeKind, Feed, StreamEnd, StreamState};
pub use table::{CorrelationTable, DEFAULT_CLOSED_ID_MEMORY, Inbound};
