//! Role table: whitespace-separated `username role` pairs, one per line.
//!
//! Loaded once at startup; a missing or unreadable file is a startup error,
//! not a per-session one. Lookups are first-match-wins and case-sensitive.
//! Only the literal role `write` grants edit permission; any other role
//! string authenticates with read access.

use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RoleLoadError {
    #[error("failed to read role file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    entries: Vec<(String, String)>,
}

impl RoleTable {
    pub fn load(path: &Path) -> Result<Self, RoleLoadError> {
        let text = fs::read_to_string(path).map_err(|source| RoleLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut entries = Vec::new();
        for line in text.lines() {
            let mut words = line.split_whitespace();
            let (Some(user), Some(role)) = (words.next(), words.next()) else {
                continue;
            };
            entries.push((user.to_string(), role.to_string()));
        }
        info!(
            target: "server.roles",
            path = %path.display(),
            entries = entries.len(),
            "role_table_loaded"
        );
        Ok(Self { entries })
    }

    pub fn from_pairs<I, U, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, R)>,
        U: Into<String>,
        R: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(user, role)| (user.into(), role.into()))
                .collect(),
        }
    }

    /// Role of `username`; first match wins.
    pub fn lookup(&self, username: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(user, _)| user == username)
            .map(|(_, role)| role.as_str())
    }

    pub fn write_access(role: &str) -> bool {
        role == "write"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(content: &str) -> RoleTable {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        RoleTable::load(file.path()).unwrap()
    }

    #[test]
    fn looks_up_roles_by_username() {
        let roles = table("alice write\nbob read\n");
        assert_eq!(roles.lookup("alice"), Some("write"));
        assert_eq!(roles.lookup("bob"), Some("read"));
        assert_eq!(roles.lookup("mallory"), None);
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let roles = table("alice write\n");
        assert_eq!(roles.lookup("Alice"), None);
    }

    #[test]
    fn first_match_wins() {
        let roles = table("alice read\nalice write\n");
        assert_eq!(roles.lookup("alice"), Some("read"));
    }

    #[test]
    fn blank_and_partial_lines_are_skipped() {
        let roles = table("\nalice write\njusta_name\n\nbob read\n");
        assert_eq!(roles.lookup("alice"), Some("write"));
        assert_eq!(roles.lookup("bob"), Some("read"));
        assert_eq!(roles.lookup("justa_name"), None);
    }

    #[test]
    fn only_the_write_role_grants_write_access() {
        assert!(RoleTable::write_access("write"));
        assert!(!RoleTable::write_access("read"));
        assert!(!RoleTable::write_access("admin"));
        assert!(!RoleTable::write_access("WRITE"));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = RoleTable::load(Path::new("/nonexistent/roles.txt")).unwrap_err();
        assert!(matches!(err, RoleLoadError::Io { .. }));
    }
}
