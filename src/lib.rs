//! # uploadq
//!
//! Upload coordination for a personal storage appliance. Peers ask the daemon to upload
//! files with small OSC-style UDP datagrams; the daemon queues each path, runs one upload
//! task per path against a storage backend and reports the outcome back to the manager.

pub mod commands;
pub mod config;
pub mod credentials;
pub mod daemon;
pub mod dispatcher;
pub mod fault;
pub mod notifier;
pub mod osc;
pub mod protocol;
pub mod queue;
pub mod storage;
pub mod worker;
