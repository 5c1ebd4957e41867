//! Observability for the authenticator.
//!
//! Only metric recording lives here; installing an exporter is the embedding
//! service's job.

pub mod metrics;
