use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding uploaded tracks, addressed by stored filename
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,

    /// Directory holding cover images, served under `/covers`
    #[serde(default = "default_covers_dir")]
    pub covers_dir: PathBuf,
}

fn default_music_dir() -> PathBuf {
    PathBuf::from("./data/music")
}
fn default_covers_dir() -> PathBuf {
    PathBuf::from("./data/covers")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            covers_dir: default_covers_dir(),
        }
    }
}
