use crate::camera::Camera;
use crate::error::{LpcError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub dedicated_scratch: bool,
    /// Read the build back and check it against the host reference.
    pub validate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub build: BuildConfig,
    pub camera: Camera,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| LpcError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LpcError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Command line values win over the file.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(input) = &overrides.input {
            self.input = Some(input.clone());
        }
        self.build.validate |= overrides.validate;
        self.build.dedicated_scratch |= overrides.dedicated_scratch;
    }
}

/// Settings that can be given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub validate: bool,
    pub dedicated_scratch: bool,
}
