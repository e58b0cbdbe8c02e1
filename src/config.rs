//! Settings, layered: built-in defaults, then an optional file, then
//! `TYPEWRIGHT__*` environment variables.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::persist::PersistenceMode;

pub const DEFAULT_CONFIG_FILE: &str = "typewright";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    /// File stem shared by the schema, store and change log files.
    pub project: String,
    /// Where the project lives. Without one everything stays in memory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    pub log_filter: String,
}

impl Settings {
    /// Loads settings from `file` (any format the `config` crate knows), or
    /// from `typewright.toml` and friends in the working directory when no
    /// file is given. A missing default file is not an error.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let source = match file {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .set_default("project", "schema")?
            .set_default("log_filter", "info")?
            .add_source(source)
            .add_source(Environment::with_prefix("TYPEWRIGHT").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn persistence_mode(&self) -> PersistenceMode {
        match &self.directory {
            Some(directory) => PersistenceMode::Project {
                directory: directory.clone(),
                name: self.project.clone(),
            },
            None => PersistenceMode::InMemory,
        }
    }
}
