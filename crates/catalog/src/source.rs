//! Pluggable catalog load sources.

use async_trait::async_trait;
use mcpctl_domain::error::ControlError;
use mcpctl_domain::Catalog;
use std::path::PathBuf;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> Result<Catalog, ControlError>;
}

/// Loads a [`Catalog`] from a TOML file on disk.
pub struct TomlFileCatalogSource {
    path: PathBuf,
}

impl TomlFileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for TomlFileCatalogSource {
    async fn load(&self) -> Result<Catalog, ControlError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ControlError::Internal(format!("reading catalog file: {e}")))?;
        toml::from_str(&raw).map_err(|e| ControlError::Internal(format!("parsing catalog file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_valid_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        tokio::fs::write(
            &path,
            r#"
            [specs.calc]
            name = "calc"
            transport = "stdio"
            cmd = ["calc-srv"]
            "#,
        )
        .await
        .unwrap();

        let source = TomlFileCatalogSource::new(path);
        let catalog = source.load().await.unwrap();
        assert!(catalog.specs.contains_key("calc"));
    }

    #[tokio::test]
    async fn missing_file_is_internal_error() {
        let source = TomlFileCatalogSource::new("/nonexistent/path/catalog.toml");
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, ControlError::Internal(_)));
    }
}
