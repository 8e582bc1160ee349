//! Infrastructure Adapters
//!
//! Implementations of the domain ports: the three storage tiers and the
//! event publishers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ SledAdapter (structured) │ FlatFileAdapter (flat)          │ │
//! │  │ MemoryAdapter (volatile) │ LoggingEventPublisher           │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod event_publisher;
mod flat_file;
mod memory;
mod structured;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use flat_file::{FlatFileAdapter, FlatFileConfig};
pub use memory::MemoryAdapter;
pub use structured::{SledAdapter, SCHEMA_VERSION};
