//! The probe's `probe.toml` and its command line overrides.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::WrapErr;
use rgpu_device::DeviceSelectConfig;
use serde::Deserialize;

/// Contents of `probe.toml`.
///
/// ```toml
/// [device]
/// preferred_device = 0
/// validation = true
/// ```
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ProbeConfig {
    pub device: DeviceSelectConfig,
}

impl ProbeConfig {
    pub(crate) fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read `explicit` if given, otherwise `fallback` if it exists. A
    /// missing fallback is not an error.
    pub(crate) fn load(
        explicit: Option<&Path>,
        fallback: Option<PathBuf>,
    ) -> eyre::Result<Self> {
        let path = match (explicit, fallback) {
            (Some(path), _) => path.to_owned(),
            (None, Some(path)) if path.is_file() => path,
            _ => return Ok(Self::default()),
        };
        tracing::debug!("Reading config from {}", path.display());
        let text = fs::read_to_string(&path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        Self::parse(&text).wrap_err_with(|| format!("parsing {}", path.display()))
    }

    /// Apply command line overrides. `device` uses the signed convention
    /// where a negative index means "no preference".
    pub(crate) fn with_overrides(
        self,
        device: Option<i64>,
        validation: bool,
    ) -> DeviceSelectConfig {
        let validation = validation || self.device.validation;
        match device {
            Some(index) => DeviceSelectConfig::from_legacy_index(index, validation),
            None => DeviceSelectConfig {
                validation,
                ..self.device
            },
        }
    }
}
