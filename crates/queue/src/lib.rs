//! Background job queue for resume generation and application submission.
//!
//! Two backends implement the shared [`JobQueue`] contract:
//!
//! - [`ListQueue`]: JSON records with a TTL plus a FIFO list of ids, over any
//!   [`ListStore`] (Redis in production, [`MemoryStore`] in tests). Supports
//!   blocking polls and full record access.
//! - [`BrokerQueue`]: persistent messages on a durable exchange with a
//!   dead-letter exchange, over any [`BrokerTransport`] (AMQP in production,
//!   [`MemoryBroker`] in tests). Consumed through [`Consumable`].

pub mod broker;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod job;
pub mod list;
pub mod store;

pub use broker::{AmqpTransport, BrokerQueue, BrokerTransport, Delivery, MemoryBroker, Topology};
pub use config::{connect, BackendKind, ConfigError, QueueConfig};
pub use contract::{
    require_capability, Capability, Consumable, JobQueue, JobSubscription, QueueCapabilities,
};
pub use error::{QueueError, QueueResult};
pub use events::{JobEvent, JobEventBus};
pub use job::{
    ApplicationSubmission, ErrorKind, Job, JobError, JobPayload, JobResult, JobStatus,
    ResumeGeneration, StatusUpdate, UnknownStatus, DEFAULT_MAX_RETRIES,
};
pub use list::ListQueue;
pub use store::{ListStore, MemoryStore, RedisStore};
