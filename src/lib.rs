//! PontoFácil device pairing and authentication core.
//!
//! An admin issues a single-use pairing code for one employee; the
//! employee's phone consumes it exactly once to obtain a long-lived
//! device secret; the phone later exchanges that secret — after a fresh
//! biometric confirmation — for a short-lived bearer session whose role
//! claim gates the client UI. The backend remains the authority for
//! every privileged action; client-side role decoding is advisory only.

pub mod auth;
pub mod biometric;
pub mod client;
pub mod config;
pub mod credentials;
pub mod gateway;
