//! Records Request: guided public-records request wizard with
//! entitlement-gated, payment-interruptible submission.

pub mod api;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod generation;
pub mod notify;
pub mod payment;
pub mod remote;
pub mod store;
pub mod submission;
pub mod user;
pub mod wizard;
