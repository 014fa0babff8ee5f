//! GSuite MCP Server Library
//!
//! A Model Context Protocol (MCP) server for Google Workspace. Every Google
//! API call runs through the retry executor in [`retry`], which retries rate
//! limits and server errors with exponential backoff.

pub mod config;
pub mod error;
pub mod google;
pub mod mcp;
pub mod retry;

pub use config::Config;
pub use error::{GsuiteMcpError, Result};
pub use retry::{should_retry, with_retry, HttpStatusError, RetryPolicy};
