//! yadisk-fs - Yandex Disk as a hierarchical filesystem
//!
//! The `providers` module adapts the flat, paginated disk API into the
//! `RemoteFs`/`RemoteObject` contract; `config` stores named remotes.

pub mod config;
pub mod providers;

pub use config::{default_config_path, load_config, save_config, ConfigFile, RemoteConfig};
pub use providers::{
    DirEntry, FsOptions, HashType, ListDepth, ListItem, Opened, ProviderError, RemoteFs, RemoteObject, SourceInfo,
    YandexFs, YandexObject,
};
