//! remedyctl - detect and remediate Windows endpoint compliance.
//!
//! The crate is a reusable detect/remediate reconciliation engine plus four
//! built-in check packs (disk space, Windows Update health, WSUS policy
//! hygiene, Lenovo BIOS Secure Boot). The engine walks registered steps in
//! order, probing state, correcting drift within a bounded retry budget,
//! and reporting the 0/1 exit-code contract a device-management agent
//! expects from a detect/remediate pair.

pub mod audit;
pub mod checks;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
