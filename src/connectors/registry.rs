use crate::config::Config;

use super::article::ArticleConnector;
use super::filesystem::FilesystemConnector;
use super::git::GitConnector;
use super::Connector;

/// Ordered connectors plus the one used when none match.
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
    fallback: Box<dyn Connector>,
}

impl ConnectorRegistry {
    pub fn new(fallback: Box<dyn Connector>) -> Self {
        Self {
            connectors: Vec::new(),
            fallback,
        }
    }

    /// git, then filesystem, with the article connector as fallback.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new(Box::new(ArticleConnector::new()));
        registry.register(Box::new(GitConnector::new(
            config.connectors.git.clone(),
            config.db.path.clone(),
        )));
        registry.register(Box::new(FilesystemConnector::new(
            config.connectors.filesystem.clone(),
        )));
        registry
    }

    /// Matchers are checked in registration order.
    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn resolve(&self, link: &str) -> &dyn Connector {
        match self.connectors.iter().find(|c| c.matches(link)) {
            Some(c) => c.as_ref(),
            None => {
                tracing::debug!(link, fallback = self.fallback.name(), "no connector matched");
                self.fallback.as_ref()
            }
        }
    }

    /// Registered connectors followed by the fallback.
    pub fn connectors(&self) -> impl Iterator<Item = &dyn Connector> {
        self.connectors
            .iter()
            .map(|c| c.as_ref())
            .chain(std::iter::once(self.fallback.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ConnectorRegistry {
        ConnectorRegistry::from_config(&Config::with_db_path("/tmp/wiz-test.sqlite"))
    }

    #[test]
    fn test_resolves_in_order_with_fallback() {
        let reg = registry();
        assert_eq!(reg.resolve("https://github.com/hummingbot/hummingbot").name(), "git");
        assert_eq!(reg.resolve("https://www.github.com/org/repo").name(), "git");
        assert_eq!(reg.resolve("file:///srv/docs").name(), "filesystem");
        assert_eq!(reg.resolve("https://blog.example/post").name(), "article");
        // host must be exactly github.com
        assert_eq!(reg.resolve("https://notgithub.com/x").name(), "article");
    }

    #[test]
    fn test_connectors_lists_fallback_last() {
        let reg = registry();
        let names: Vec<&str> = reg.connectors().map(|c| c.name()).collect();
        assert_eq!(names, vec!["git", "filesystem", "article"]);
    }
}
