use anyhow::{Context, Result};
use pkg_constants::cluster::DEFAULT_NAMESPACE;
use pkg_constants::paths::DEFAULT_CONFIG_FILE;
use pkg_types::config::{KutexConfigFile, load_config_file};
use pkg_types::validate::validate_namespace;
use std::path::PathBuf;

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub namespace: String,
    pub kubeconfig: Option<String>,
    pub context: Option<String>,
}

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub kubeconfig: Option<String>,
    pub context: Option<String>,
}

impl Settings {
    /// Merge: CLI args > config file > defaults
    pub fn resolve(cli: Overrides, file: KutexConfigFile) -> Result<Self> {
        let namespace = cli
            .namespace
            .or(file.namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        validate_namespace(&namespace).context("invalid namespace")?;

        Ok(Self {
            namespace,
            kubeconfig: cli.kubeconfig.or(file.kubeconfig),
            context: cli.context.or(file.context),
        })
    }

    /// Load the config file (explicit path, else `~/.kutex/config.yaml`) and merge.
    pub fn load(cli: Overrides, config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE)));

        let file: KutexConfigFile = match path {
            Some(p) => {
                let p = p.to_string_lossy().into_owned();
                load_config_file(&p).with_context(|| format!("cannot load config file {}", p))?
            }
            None => KutexConfigFile::default(),
        };
        Self::resolve(cli, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::resolve(Overrides::default(), KutexConfigFile::default()).unwrap();
        assert_eq!(s.namespace, "default");
        assert!(s.kubeconfig.is_none());
        assert!(s.context.is_none());
    }

    #[test]
    fn test_cli_beats_config_file() {
        let file = KutexConfigFile {
            namespace: Some("payments".to_string()),
            kubeconfig: Some("/etc/kutex/kubeconfig".to_string()),
            context: Some("prod".to_string()),
        };
        let cli = Overrides {
            namespace: Some("staging".to_string()),
            kubeconfig: None,
            context: Some("staging-admin".to_string()),
        };

        let s = Settings::resolve(cli, file).unwrap();
        assert_eq!(s.namespace, "staging");
        assert_eq!(s.kubeconfig.as_deref(), Some("/etc/kutex/kubeconfig"));
        assert_eq!(s.context.as_deref(), Some("staging-admin"));
    }

    #[test]
    fn test_invalid_namespace_rejected() {
        let cli = Overrides {
            namespace: Some("Not_A_Namespace".to_string()),
            ..Default::default()
        };
        assert!(Settings::resolve(cli, KutexConfigFile::default()).is_err());
    }

    #[test]
    fn test_missing_explicit_config_file_uses_defaults() {
        let s = Settings::load(Overrides::default(), Some("/nonexistent/kutex.yaml")).unwrap();
        assert_eq!(s.namespace, "default");
    }
}
