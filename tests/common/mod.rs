//! Integration test common infrastructure.
//!
//! Provides an in-process server bound to an ephemeral port and a client
//! that talks to it over real HTTP.

pub mod server;

#[allow(unused_imports)]
pub use server::{TEST_SECRET, TestServer};
