//! Deployment configuration store.
//!
//! Settings are a flat key/value document seeded from a defaults table and
//! persisted as two artifacts: `configs/deployment.json` for the UI and
//! `environment.env` (KEY=value lines) consumed by the deployment scripts.
//! The infrastructure secret is never written to either artifact; persisted
//! copies carry a redaction marker, and the real value only ever reaches
//! child processes through their environment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

/// Key holding the Prism Central password in config documents.
pub const SECRET_KEY: &str = "PRISM_CENTRAL_PASSWORD";
/// Stand-in written wherever the secret would otherwise be persisted.
pub const REDACTION_MARKER: &str = "********";

pub type ConfigDoc = Map<String, Value>;

/// Defaults table. Unset connection fields stay empty; network and SSH
/// settings carry the values the deployment scripts assume.
pub fn defaults() -> ConfigDoc {
    let doc = json!({
        "PRISM_CENTRAL_IP": "",
        "PRISM_CENTRAL_USERNAME": "",
        "PRISM_CENTRAL_PASSWORD": "",
        "PRISM_CENTRAL_VERIFY_SSL": false,
        "TARGET_CLUSTER": "",
        "TARGET_SUBNET": "",
        "TARGET_PROJECT": "",
        "STORAGE_CONTAINER": "",
        "NODE_CIDR": "10.240.0.0/16",
        "SERVICE_CIDR": "10.96.0.0/12",
        "METALLB_IP_RANGE": "192.168.1.240-192.168.1.250",
        "SSH_USERNAME": "ubuntu",
        "SSH_PRIVATE_KEY_PATH": "~/.ssh/id_rsa",
        "OUTPUT_DIRECTORY": "${PWD}/nkp-output",
        "KUBECONFIG_PATH": "${OUTPUT_DIRECTORY}/nkp-mgmt.conf",
        "DRY_RUN": false,
    });
    match doc {
        Value::Object(map) => map,
        _ => unreachable!("defaults literal is an object"),
    }
}

/// Parse env-file text: blank lines and `#` comments skipped, values split
/// on the first `=`, surrounding double quotes stripped.
pub fn parse_env_text(content: &str) -> ConfigDoc {
    let mut doc = ConfigDoc::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            doc.insert(key.trim().to_string(), Value::String(value.to_string()));
        }
    }
    doc
}

/// Parse an uploaded document: JSON first, env-file text as the fallback.
pub fn parse_flexible(content: &str) -> ConfigDoc {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => map,
        _ => parse_env_text(content),
    }
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Filesystem-backed store rooted at the deployment base directory.
pub struct ConfigStore {
    base_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn json_path(&self) -> PathBuf {
        self.base_dir.join("configs").join("deployment.json")
    }

    fn env_path(&self) -> PathBuf {
        self.base_dir.join("environment.env")
    }

    /// Load the current configuration: the JSON artifact if present, else
    /// the env file, else the defaults table. Either artifact is merged over
    /// defaults so new keys gain their default without a migration.
    pub fn load(&self) -> Result<ConfigDoc> {
        let overlay = if self.json_path().exists() {
            let text = fs::read_to_string(self.json_path())
                .with_context(|| format!("reading {}", self.json_path().display()))?;
            match serde_json::from_str::<Value>(&text)
                .with_context(|| format!("parsing {}", self.json_path().display()))?
            {
                Value::Object(map) => map,
                _ => anyhow::bail!("{} is not a JSON object", self.json_path().display()),
            }
        } else if self.env_path().exists() {
            let text = fs::read_to_string(self.env_path())
                .with_context(|| format!("reading {}", self.env_path().display()))?;
            parse_env_text(&text)
        } else {
            ConfigDoc::new()
        };

        let mut doc = defaults();
        for (key, value) in overlay {
            doc.insert(key, value);
        }
        Ok(doc)
    }

    /// Persist a configuration document to both artifacts, merged over
    /// defaults, with the secret redacted in each.
    pub fn persist(&self, data: &ConfigDoc) -> Result<()> {
        let mut doc = defaults();
        for (key, value) in data {
            doc.insert(key.clone(), value.clone());
        }
        if let Some(secret) = doc.get_mut(SECRET_KEY) {
            if !matches!(secret, Value::String(s) if s.is_empty()) {
                *secret = Value::String(REDACTION_MARKER.to_string());
            }
        }

        let json_path = self.json_path();
        if let Some(parent) = json_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&doc).context("serializing config")?;
        fs::write(&json_path, text)
            .with_context(|| format!("writing {}", json_path.display()))?;

        let mut env_lines: Vec<String> = doc
            .iter()
            .map(|(key, value)| format!("{key}={}", env_value(value)))
            .collect();
        env_lines.push(String::new());
        fs::write(self.env_path(), env_lines.join("\n"))
            .with_context(|| format!("writing {}", self.env_path().display()))?;
        Ok(())
    }

    /// Env-file text for download, materializing the artifacts from the
    /// current configuration if none exist yet.
    pub fn env_text(&self) -> Result<String> {
        if !self.env_path().exists() {
            let current = self.load()?;
            self.persist(&current)?;
        }
        fs::read_to_string(self.env_path())
            .with_context(|| format!("reading {}", self.env_path().display()))
    }

    /// The stored secret, if a run can use it. The redaction marker is not
    /// a secret, so a stored config alone never yields one.
    pub fn stored_secret(&self) -> Result<Option<String>> {
        let doc = self.load()?;
        Ok(match doc.get(SECRET_KEY) {
            Some(Value::String(s)) if !s.is_empty() && s != REDACTION_MARKER => Some(s.clone()),
            _ => None,
        })
    }
}
