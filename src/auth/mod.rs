//! Authentication and authorisation subsystem.
//!
//! Covers password hashing, signed bearer-token issuance and verification,
//! and per-request role-based access checks.  Account persistence lives in
//! [`crate::store`]; HTTP plumbing lives in [`crate::http`].

pub mod guard;
pub mod password;
pub mod service;
pub mod token;
