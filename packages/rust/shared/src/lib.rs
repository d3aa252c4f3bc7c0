//! Shared types, error model, and configuration for KeywordKit.
//!
//! This crate is the foundation depended on by all other KeywordKit crates.
//! It provides:
//! - [`KeywordKitError`] — the unified error type
//! - Domain types ([`BatchId`], [`Group`], [`Outline`], [`BatchRecord`], [`TopicTable`])
//! - Configuration ([`AppConfig`], [`ServerSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ReportConfig, Secrets, ServerConfig, ServerSettings, StoreConfig,
    apply_env_overrides, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_download_token, resolve_secrets,
};
pub use error::{KeywordKitError, Result};
pub use types::{
    ArtifactHandle, BatchId, BatchRecord, Group, Outline, OutlineSection, Requester, Topic,
    TopicTable,
};
