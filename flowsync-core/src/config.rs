//! Workspace configuration (`flowsync.yaml`).
//!
//! Lookup order: `<root>/flowsync.yaml`, then
//! `<user config dir>/flowsync/flowsync.yaml`.
//!
//! ```yaml
//! default_customer: acme
//! publish: true
//! timeout_secs: 30
//! customers:
//!   - idn: acme
//!     base_url: https://app.example.com
//!     api_key_env: ACME_API_KEY
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::paths::CONFIG_FILE;
use crate::types::CustomerIdn;

pub const DEFAULT_API_KEY_ENV: &str = "FLOWSYNC_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerConfig {
    pub idn: String,
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub default_customer: Option<String>,
    #[serde(default)]
    pub customers: Vec<CustomerConfig>,
    /// Republish flows with updated skills after a push.
    #[serde(default = "default_publish")]
    pub publish: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_publish() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl WorkspaceConfig {
    /// Resolve the customer to operate on: the explicit `requested` one, the
    /// configured default, or the only configured customer.
    pub fn customer(&self, requested: Option<&str>) -> Result<&CustomerConfig, CoreError> {
        let wanted = requested
            .map(str::to_owned)
            .or_else(|| self.default_customer.clone());
        match wanted {
            Some(idn) => self
                .customers
                .iter()
                .find(|c| c.idn == idn)
                .ok_or(CoreError::UnknownCustomer { customer: idn }),
            None if self.customers.len() == 1 => Ok(&self.customers[0]),
            None => Err(CoreError::UnknownCustomer {
                customer: "<unspecified>".to_string(),
            }),
        }
    }
}

impl CustomerConfig {
    pub fn customer_idn(&self) -> CustomerIdn {
        CustomerIdn::from(self.idn.as_str())
    }
}

/// `<root>/flowsync.yaml` — pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Load the workspace config, falling back to the user-level file.
pub fn load_at(root: &Path) -> Result<WorkspaceConfig, CoreError> {
    let local = config_path_at(root);
    if local.exists() {
        return load_file(&local);
    }
    let user = dirs::config_dir()
        .ok_or(CoreError::HomeNotFound)?
        .join("flowsync")
        .join(CONFIG_FILE);
    if user.exists() {
        return load_file(&user);
    }
    Err(CoreError::ConfigNotFound { path: local })
}

fn load_file(path: &Path) -> Result<WorkspaceConfig, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TWO_CUSTOMERS: &str = "\
default_customer: acme
customers:
  - idn: acme
    base_url: https://acme.example.com
  - idn: globex
    base_url: https://globex.example.com
    api_key_env: GLOBEX_KEY
";

    #[test]
    fn defaults_applied() {
        let root = TempDir::new().unwrap();
        std::fs::write(config_path_at(root.path()), TWO_CUSTOMERS).unwrap();
        let config = load_at(root.path()).expect("load");
        assert!(config.publish);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.customers[0].api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.customers[1].api_key_env, "GLOBEX_KEY");
    }

    #[test]
    fn customer_resolution() {
        let config: WorkspaceConfig = serde_yaml::from_str(TWO_CUSTOMERS).unwrap();
        assert_eq!(config.customer(None).unwrap().idn, "acme");
        assert_eq!(config.customer(Some("globex")).unwrap().idn, "globex");
        assert!(matches!(
            config.customer(Some("initech")),
            Err(CoreError::UnknownCustomer { .. })
        ));
    }

    #[test]
    fn single_customer_needs_no_default() {
        let config: WorkspaceConfig =
            serde_yaml::from_str("customers:\n  - idn: solo\n    base_url: http://x\n").unwrap();
        assert_eq!(config.customer(None).unwrap().idn, "solo");
    }

    #[test]
    fn malformed_config_reports_path() {
        let root = TempDir::new().unwrap();
        std::fs::write(config_path_at(root.path()), "customers: [unclosed").unwrap();
        let err = load_at(root.path()).unwrap_err();
        assert!(err.to_string().contains("flowsync.yaml"), "got: {err}");
    }
}
