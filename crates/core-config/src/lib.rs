//! Configuration loading for the markd server.
//!
//! Parses `markd.toml` with two sections: `[server]` (listen address,
//! session cap) and `[files]` (role table and save paths). Every field has a
//! default, unknown fields are ignored, and a file that fails to parse falls
//! back to defaults so a typo never keeps the server from starting. The tick
//! interval is deliberately *not* configurable here (it is the required
//! positional CLI argument), and CLI flags override anything in the file.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Address the TCP listener binds.
    #[serde(default = "ServerSection::default_listen")]
    pub listen: String,
    /// Session slots; further clients are rejected fail-closed.
    #[serde(default = "ServerSection::default_max_sessions")]
    pub max_sessions: usize,
}

impl ServerSection {
    fn default_listen() -> String {
        "127.0.0.1:4000".to_string()
    }
    const fn default_max_sessions() -> usize {
        100
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: Self::default_listen(),
            max_sessions: Self::default_max_sessions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesSection {
    /// Role table: one `username role` pair per line.
    #[serde(default = "FilesSection::default_roles")]
    pub roles: PathBuf,
    /// Where the committed document is written on teardown and shutdown.
    #[serde(default = "FilesSection::default_save")]
    pub save: PathBuf,
}

impl FilesSection {
    fn default_roles() -> PathBuf {
        PathBuf::from("roles.txt")
    }
    fn default_save() -> PathBuf {
        PathBuf::from("doc.md")
    }
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            roles: Self::default_roles(),
            save: Self::default_save(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub files: FilesSection,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Original file text, when one was found.
    pub raw: Option<String>,
    pub file: ConfigFile,
}

/// Config path: `markd.toml` in the working directory first, then the
/// platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("markd.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("markd").join("markd.toml");
    }
    local
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(Config {
                    raw: Some(content),
                    file,
                })
            }
            Err(err) => {
                warn!(target: "config", path = %path.display(), %err, "config_parse_error_using_defaults");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markd.toml");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_from(Some(PathBuf::from("/nonexistent/markd.toml"))).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.file.server.listen, "127.0.0.1:4000");
        assert_eq!(cfg.file.server.max_sessions, 100);
        assert_eq!(cfg.file.files.roles, PathBuf::from("roles.txt"));
        assert_eq!(cfg.file.files.save, PathBuf::from("doc.md"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let (_dir, path) = write_config("[server]\nlisten = \"0.0.0.0:9000\"\n");
        let cfg = load_from(Some(path)).unwrap();
        assert_eq!(cfg.file.server.listen, "0.0.0.0:9000");
        assert_eq!(cfg.file.server.max_sessions, 100);
        assert_eq!(cfg.file.files.save, PathBuf::from("doc.md"));
    }

    #[test]
    fn full_file_parses_all_sections() {
        let (_dir, path) = write_config(
            "[server]\nlisten = \"127.0.0.1:7001\"\nmax_sessions = 8\n\
             [files]\nroles = \"team.txt\"\nsave = \"out/doc.md\"\n",
        );
        let cfg = load_from(Some(path)).unwrap();
        assert_eq!(cfg.file.server.max_sessions, 8);
        assert_eq!(cfg.file.files.roles, PathBuf::from("team.txt"));
        assert_eq!(cfg.file.files.save, PathBuf::from("out/doc.md"));
        assert!(cfg.raw.is_some());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let (_dir, path) = write_config("[server]\nfuture_knob = true\n");
        let cfg = load_from(Some(path)).unwrap();
        assert_eq!(cfg.file.server.listen, "127.0.0.1:4000");
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let (_dir, path) = write_config("[server\nlisten = ");
        let cfg = load_from(Some(path)).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.file.server.max_sessions, 100);
    }
}
