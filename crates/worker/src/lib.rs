//! Reference worker for careerline job queues.
//!
//! Pulls jobs from a queue (blocking polls on the list-backed backend, push
//! deliveries on the broker-backed one), runs them through a [`JobHandler`]
//! and reports the outcome. Resume artifacts go back to the API through the
//! completion callback; other results are written to the queue directly.
//!
//! [`JobHandler`]: handler::JobHandler

pub mod callback;
pub mod config;
pub mod handler;
pub mod runner;
