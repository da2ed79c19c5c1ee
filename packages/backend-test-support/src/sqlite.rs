//! Throwaway file-backed SQLite databases.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A SQLite file inside its own temporary directory, removed on drop.
#[derive(Debug)]
pub struct TempSqlite {
    _dir: TempDir,
    path: PathBuf,
}

impl TempSqlite {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("scribe-db-").tempdir()?;
        let path = dir.path().join("scribe.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `sqlite:///` followed by the absolute path, i.e. four slashes on Unix.
    pub fn url(&self) -> String {
        format!("sqlite:///{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_points_at_absolute_path() {
        let db = TempSqlite::new().unwrap();
        assert!(db.path().is_absolute());
        assert!(db.url().starts_with("sqlite:///"));
        assert!(db.url().ends_with("scribe.db"));
        assert!(!db.path().exists());
    }
}
