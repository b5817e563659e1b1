#![forbid(unsafe_code)]
#![warn(
    clippy::pedantic,
    clippy::must_use_candidate,
    clippy::empty_enum,
    clippy::unwrap_used
)]
#![allow(
    clippy::new_without_default,
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod client;
pub mod crypto;
pub mod dispatch;
pub mod reconnect;
pub mod voice;

/// This module provides the composable connection primitives (sockets,
/// heartbeat bookkeeping, the UDP transport) that the higher level
/// [`client`] and [`voice`] modules are built from.
///
/// It enables developers to define their own session handling tailored
/// to their specific needs.
pub mod net;
