//! [![unsafe forbidden](https://img.shields.io/badge/unsafe-forbidden-success.svg)](https://github.com/rust-secure-code/safety-dance/)
//!
//! An async connection pool for relational databases with:
//! - Bounded, non-blocking admission of callers
//! - Single-flight connection creation
//! - Deferred release of connections held by streamed results and open transactions
//! - A single shared connection for all notification listeners
//!
//! ### Operations
//!
//! | Operation                                                       | Connection released                          |
//! | --------------------------------------------------------------- | -------------------------------------------- |
//! | [query](r#async::ConnectionPool::query)                         | immediately, or once the row stream finishes |
//! | [execute](r#async::ConnectionPool::execute)                     | immediately, or once the row stream finishes |
//! | [prepare](r#async::ConnectionPool::prepare)                     | right after preparation, then per execution  |
//! | [notify](r#async::ConnectionPool::notify)                       | immediately                                  |
//! | [listen](r#async::ConnectionPool::listen)                       | once the last listener unsubscribes          |
//! | [begin_transaction](r#async::ConnectionPool::begin_transaction) | on commit or rollback                        |
//!
//! ### Backends
//!
//! | Backend                                                            | Feature          |
//! | ------------------------------------------------------------------ | ---------------- |
//! | [tokio-postgres](https://docs.rs/tokio-postgres/0.7.13/tokio_postgres/) | `tokio-postgres` |
//!
//! Any other driver can be plugged in by implementing
//! [`Connector`](r#async::Connector) and [`Connection`](r#async::Connection).

#![forbid(unsafe_code)]
#![deny(
    missing_docs,
    clippy::cargo,
    clippy::complexity,
    clippy::correctness,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    clippy::unwrap_used
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::module_inception,
    clippy::missing_errors_doc
)]

mod common;

/// Async connection pool
pub mod r#async;
mod util;

pub use common::config::*;
