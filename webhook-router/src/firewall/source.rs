//! Where the firewall document is persisted.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Backing store for the firewall document.
#[derive(Debug)]
pub enum ConfigSource {
    /// JSON file on disk
    File(PathBuf),
    /// Held in memory, used by tests and ephemeral deployments
    Memory(Mutex<String>),
}

impl ConfigSource {
    pub fn memory(initial: impl Into<String>) -> Self {
        ConfigSource::Memory(Mutex::new(initial.into()))
    }

    pub async fn read(&self) -> Result<String> {
        match self {
            ConfigSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read firewall config {}", path.display())),
            ConfigSource::Memory(data) => Ok(data
                .lock()
                .map_err(|_| anyhow::anyhow!("firewall config lock poisoned"))?
                .clone()),
        }
    }

    pub async fn write(&self, value: String) -> Result<()> {
        match self {
            ConfigSource::File(path) => tokio::fs::write(path, value)
                .await
                .with_context(|| format!("Failed to write firewall config {}", path.display())),
            ConfigSource::Memory(data) => {
                *data
                    .lock()
                    .map_err(|_| anyhow::anyhow!("firewall config lock poisoned"))? = value;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source() {
        let source = ConfigSource::memory("{}");
        assert_eq!(source.read().await.unwrap(), "{}");

        source.write("{\"adminUsers\": []}".to_string()).await.unwrap();
        assert_eq!(source.read().await.unwrap(), "{\"adminUsers\": []}");
    }

    #[tokio::test]
    async fn test_file_source() {
        let path = std::env::temp_dir().join(format!("whr-firewall-{}.json", uuid::Uuid::new_v4()));
        let source = ConfigSource::File(path.clone());

        assert!(source.read().await.is_err());

        source.write("{}".to_string()).await.unwrap();
        assert_eq!(source.read().await.unwrap(), "{}");

        let _ = std::fs::remove_file(path);
    }
}
