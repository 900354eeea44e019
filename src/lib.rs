//! chatfolio is the chat backend of a personal portfolio site.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the streaming pipeline: [`core::reframe`] turns upstream SSE
//!   lines into word-sized text tokens and whole function calls, and
//!   [`core::chat_stream`] drives it from the upstream HTTP body.
//! - [`server`] exposes `POST /api/chat` over actix-web.
//! - [`api`] defines the request and streamed response payloads.
//! - [`cli`] parses arguments and dispatches to the server or offline helpers.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod server;
