//! Twin core library: session, backend API client, and the chat screen state shared by the CLI and
//! desktop applications.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod controller;
pub mod conversations;
pub mod dialog;
pub mod forms;
pub mod init;
pub mod personas;
pub mod session;
pub mod sidebar;
pub mod transcript;

#[cfg(test)]
mod test_support;
