//! Supported resource kinds
//!
//! Each kind decodes its attribute table strictly: a misspelled or unknown
//! attribute is an error, not a silently ignored key.

pub mod apt;
pub mod shell;

pub use apt::Apt;
pub use shell::Shell;

use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::resource::Resource;
use crate::stanza::ResourceKey;
use crate::types::ApplyResult;
use serde::de::DeserializeOwned;
use toml::{Table, Value};

/// A decoded resource of one of the supported kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Apt(Apt),
    Shell(Shell),
}

impl State {
    /// Decode the attributes of `key` into the structure of its kind
    pub fn decode(key: &ResourceKey, attributes: Table) -> Result<Self> {
        match key.kind.as_str() {
            apt::KIND => decode_attributes(key, attributes).map(Self::Apt),
            shell::KIND => decode_attributes(key, attributes).map(Self::Shell),
            other => Err(Error::UnknownResourceKind {
                kind: other.to_string(),
                resource: key.to_string(),
            }),
        }
    }

    fn as_resource(&self) -> &dyn Resource {
        match self {
            Self::Apt(apt) => apt,
            Self::Shell(shell) => shell,
        }
    }
}

fn decode_attributes<T: DeserializeOwned>(key: &ResourceKey, attributes: Table) -> Result<T> {
    Value::Table(attributes)
        .try_into()
        .map_err(|e: toml::de::Error| Error::AttributeDecode {
            resource: key.to_string(),
            message: e.to_string().trim().to_string(),
        })
}

pub(crate) const fn default_true() -> bool {
    true
}

impl Resource for State {
    fn kind(&self) -> &'static str {
        self.as_resource().kind()
    }

    fn describe(&self) -> String {
        self.as_resource().describe()
    }

    fn merge(&mut self, peer: &Self) {
        match (self, peer) {
            (Self::Apt(this), Self::Apt(other)) => this.merge(other),
            (Self::Shell(this), Self::Shell(other)) => this.merge(other),
            _ => {}
        }
    }

    fn pre(&self, ctx: &ApplyContext) -> Result<()> {
        self.as_resource().pre(ctx)
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        self.as_resource().apply(ctx)
    }

    fn post(&self, ctx: &ApplyContext) -> Result<()> {
        self.as_resource().post(ctx)
    }
}
