//! CLI commands.

pub mod ask;
pub mod build_index;
pub mod chat;
pub mod info;
pub mod models;
