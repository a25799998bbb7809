//! Liqshell Library
//!
//! This library provides the building blocks of the liqshell command
//! line client for Liquidsoap servers:
//!
//! - `proto` - connection handling and framing for the command protocol
//! - `console` - the interactive shell with editing and completion
//! - `batch` - sequential execution of command files
//! - `history` - persistent command history for the console
//!
//! # Proto Module
//!
//! The `proto` module is the core of the crate; the two front ends in
//! `console` and `batch` are thin layers over it:
//!
//! ```ignore
//! use futures::FutureExt;
//! use liqshell::proto::{with_connection, ServerAddr};
//!
//! let addr = ServerAddr::parse("localhost:1234")?;
//! let version = with_connection(addr, |conn| {
//!     async move { conn.send("version").await }.boxed()
//! })
//! .await?;
//! ```

pub mod batch;
pub mod console;
pub mod history;
pub mod proto;
