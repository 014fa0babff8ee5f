//! MCP (Model Context Protocol) module
//!
//! JSON-RPC over stdio exposing the Google services as tools, resources
//! and prompts.

pub mod prompts;
pub mod resources;
pub mod server;
pub mod tools;
pub mod types;
