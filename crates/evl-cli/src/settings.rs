use std::path::Path;

use anyhow::Context;
use evl_forwarder::DispatchConfig;
use evl_ledger::LedgerSettings;
use serde::{Deserialize, Serialize};

/// Contents of the optional `--config` file.
///
/// The ledger credential is never read from here; it comes only from the
/// environment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ledger: LedgerSettings,
    pub dispatch: DispatchConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing settings in {}", path.display()))
    }
}
