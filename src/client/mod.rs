//! Client-side plumbing: the typed HTTP client and the mobile
//! pairing/login flow built on top of it.

pub mod api;
pub mod flow;
