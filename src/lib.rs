//! spacetraveling: a blog generator and preview server for a headless CMS
//!
//! Posts are pulled from a Prismic-style content API and rendered with Tera
//! templates embedded in the binary. The listing pages through the API with
//! opaque cursors, and every post links to its chronological neighbors.

pub mod commands;
pub mod config;
pub mod content;
pub mod gateway;
pub mod generator;
pub mod helpers;
pub mod pagination;
pub mod server;
pub mod templates;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gateway::{ContentGateway, FixtureGateway, PrismicClient};

/// The main site application
#[derive(Debug, Clone)]
pub struct Site {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
    /// Static assets copied into the output as-is
    pub static_dir: PathBuf,
}

impl Site {
    /// Create a new site from a directory, reading `_config.yml` if present
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("_config.yml");

        let config = if config_path.exists() {
            config::SiteConfig::load(&config_path)?
        } else {
            config::SiteConfig::default()
        };

        let public_dir = base_dir.join(&config.public_dir);
        let static_dir = base_dir.join(&config.static_dir);

        Ok(Self {
            config,
            base_dir,
            public_dir,
            static_dir,
        })
    }

    /// Build the content gateway: a fixture dump when given, the CMS otherwise
    pub fn gateway(&self, fixture: Option<&Path>) -> Result<Arc<dyn ContentGateway>> {
        if let Some(fixture) = fixture {
            let path = if fixture.is_absolute() {
                fixture.to_path_buf()
            } else {
                self.base_dir.join(fixture)
            };
            return Ok(Arc::new(FixtureGateway::load(path)?));
        }

        if self.config.cms.endpoint.is_empty() {
            anyhow::bail!(
                "No CMS endpoint configured. Set cms.endpoint in _config.yml or {}, or pass --fixture",
                config::ENDPOINT_ENV
            );
        }
        tracing::debug!("Using CMS at {}", self.config.cms.endpoint);
        Ok(Arc::new(PrismicClient::new(&self.config.cms)?))
    }

    /// Generate the static site
    pub async fn generate(&self, gateway: Arc<dyn ContentGateway>) -> Result<()> {
        commands::generate::run(self, gateway).await
    }

    /// Clean the public directory
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_site_reads_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("_config.yml"),
            "title: Space\npublic_dir: out\n",
        )
        .unwrap();
        let site = Site::new(dir.path()).unwrap();
        assert_eq!(site.config.title, "Space");
        assert_eq!(site.public_dir, dir.path().join("out"));
        assert_eq!(site.static_dir, dir.path().join("static"));
    }

    #[test]
    fn test_gateway_requires_endpoint_or_fixture() {
        let dir = TempDir::new().unwrap();
        let site = Site::new(dir.path()).unwrap();
        assert!(site.gateway(None).is_err());

        std::fs::write(dir.path().join("posts.json"), "[]").unwrap();
        assert!(site.gateway(Some(Path::new("posts.json"))).is_ok());
    }

    #[tokio::test]
    async fn test_generate_and_clean() {
        let dir = TempDir::new().unwrap();
        let site = Site::new(dir.path()).unwrap();
        let gateway: Arc<dyn ContentGateway> = Arc::new(FixtureGateway::new(Vec::new()));

        site.generate(gateway).await.unwrap();
        let index = std::fs::read_to_string(site.public_dir.join("index.html")).unwrap();
        assert!(!index.contains("Carregar mais posts"));

        site.clean().unwrap();
        assert!(!site.public_dir.exists());
    }
}
