use serde::{Deserialize, Serialize};

/// CLI configuration file (YAML).
///
/// Example `~/.kutex/config.yaml`:
/// ```yaml
/// namespace: payments
/// kubeconfig: /home/ops/.kube/staging
/// context: staging-admin
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KutexConfigFile {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, alias = "kube-config")]
    pub kubeconfig: Option<String>,
    #[serde(default, alias = "kube-context")]
    pub context: Option<String>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    // An empty file deserializes to YAML null.
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
