//! Sequential co-signature and approval workflows
//!
//! A document or record (an [`envelope::Envelope`]) passes through an
//! ordered chain of signer slots, one turn at a time. The pure transition
//! logic lives in [`engine`]; [`service::EnvelopeService`] orchestrates
//! storage, authorization and notifications around it.

pub mod artifact;
pub mod auth;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod notify;
pub mod repository;
pub mod service;
pub mod utils;

pub use error::{Result, WorkflowError};
