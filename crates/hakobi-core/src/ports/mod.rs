//! Ports: the seams to external collaborators.
//!
//! The only external collaborator of this core is the remote process engine;
//! `LeaseClient` is its port. Implementations live under `impls`
//! (HTTP for production, in-memory for development and tests).

pub mod lease_client;

pub use lease_client::LeaseClient;
