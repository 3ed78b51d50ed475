//! Media Depot - central depot for saving social-media posts.
//!
//! Accepts a user-pasted "share" reference to a post, resolves it through a
//! platform adapter, downloads the media with resume/retry support, and
//! stores everything exactly once: media files are deduplicated by content
//! digest and entity rows are created race-safely under concurrent workers.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod download;
pub mod models;
pub mod queue;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
pub mod utils;
