//! Async Client Module
//!
//! A non-blocking client that plugs into any single-threaded readiness
//! reactor through the [`EventLoop`] trait and a set of [`Hooks`].
//!
//! ## Data Flow
//! ```text
//!  queue_with(cmd, cb)          reactor: fd writable        reactor: fd readable
//!         │                            │                            │
//!         ▼                            ▼                            ▼
//!  encode ─▶ write_buf ──────▶ handle_write ──▶ socket ──▶ handle_read ──▶ decoder
//!         │                      (drop write                        │
//!         ▼                       interest when                     ▼
//!  pending FIFO ◀─────────────── drained)                 pop FIFO, run callback
//! ```
//!
//! Subscribe and unsubscribe requests hold their place in the FIFO like any
//! other request; push mode switches when their confirmations arrive.
//!
//! The reactor is never owned by the client; the embedding application
//! drives it with [`EventLoop::run`].

mod event_loop;
mod hooks;
mod pubsub;
mod client;

pub use event_loop::{EventLoop, Interest, InterestHandle, ReadyHandler};
pub use hooks::{AddInterestHook, DelInterestHook, Hooks, StatusHook};
pub use client::{AsyncClient, ReplyCallback};
