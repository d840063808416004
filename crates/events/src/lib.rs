//! Event mechanics for the billing pipeline.
//!
//! Billing reacts to domain events (payments recorded, invoices canceled)
//! through an explicit, ordered pipeline: producers publish tenant- and
//! member-scoped envelopes on a bus, and consumers guard ordering with a
//! per-member stream cursor. This crate holds the mechanics only; the
//! billing events themselves live in `cropshare-billing`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod stream;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use stream::{StreamCursor, StreamError};
pub use tenant::TenantScoped;
