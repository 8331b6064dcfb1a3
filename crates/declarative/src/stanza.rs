//! Declared resource blocks and their identities
//!
//! A declaration document is TOML whose tables nest three levels deep:
//! `[kind.group.name]`. Each innermost table is one stanza and its keys are
//! the stanza's attributes.

use crate::error::{Error, Result};
use std::fmt;
use toml::{Table, Value};

/// Separator between the labels of a reference such as `apt.update.base`
pub const SEPARATOR: char = '.';

/// One declared block before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawStanza {
    /// Labels leading to the block, outermost first
    pub labels: Vec<String>,
    /// Attribute body, `requires` included
    pub attributes: Table,
    /// Name of the document the block came from
    pub source: String,
}

impl RawStanza {
    pub fn new(labels: Vec<String>, attributes: Table, source: impl Into<String>) -> Self {
        Self {
            labels,
            attributes,
            source: source.into(),
        }
    }

    /// Validate the labels into a resource key
    pub fn key(&self) -> Result<ResourceKey> {
        match self.labels.as_slice() {
            [kind, group, name] => Ok(ResourceKey::new(kind, group, name)),
            _ => Err(Error::InvalidStanza {
                labels: self.labels.join("."),
                source_name: self.source.clone(),
            }),
        }
    }
}

/// The three-part identity of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub kind: String,
    pub group: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            group: group.into(),
            name: name.into(),
        }
    }

    /// Stable identifier used to resolve dependency references
    ///
    /// ```
    /// use declarative::ResourceKey;
    ///
    /// let key = ResourceKey::new("apt", "update", "base");
    /// assert_eq!(key.identifier(), "aptupdatebase");
    /// ```
    pub fn identifier(&self) -> String {
        dependency_identifier(&format!("{}{}{}", self.kind, self.group, self.name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.kind, self.group, self.name)
    }
}

/// Identifier a `requires` reference resolves to
pub fn dependency_identifier(reference: &str) -> String {
    reference.chars().filter(|&c| c != SEPARATOR).collect()
}

/// A vertex of the resolved graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    /// Synthetic ancestor of every resource without dependencies
    Root,
    Resource(ResourceKey),
}

impl Node {
    /// Identifier the node is registered under
    ///
    /// The root's identifier is a lone separator, which no stripped
    /// reference can produce.
    pub fn identifier(&self) -> String {
        match self {
            Self::Root => SEPARATOR.to_string(),
            Self::Resource(key) => key.identifier(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Resource(key) => key.fmt(f),
        }
    }
}

/// Depth of a complete stanza path
const LABEL_DEPTH: usize = 3;

/// Parse one TOML document into stanzas, in declaration order
///
/// Non-table values found above the third level are gathered into a stanza
/// labelled with the path of their enclosing table, which fails validation
/// later as an invalid stanza. A short table with nothing below it becomes
/// such a stanza as well.
pub fn parse_document(source: &str, text: &str) -> Result<Vec<RawStanza>> {
    let document: Table = text.parse().map_err(|e: toml::de::Error| Error::Parse {
        source_name: source.to_string(),
        message: e.to_string().trim().to_string(),
    })?;

    let mut stanzas = Vec::new();
    collect(document, &mut Vec::new(), source, &mut stanzas);
    Ok(stanzas)
}

fn collect(table: Table, path: &mut Vec<String>, source: &str, out: &mut Vec<RawStanza>) {
    if path.len() == LABEL_DEPTH {
        out.push(RawStanza::new(path.clone(), table, source));
        return;
    }

    let mut stray = Table::new();
    let mut children = Vec::new();
    for (key, value) in table {
        match value {
            Value::Table(child) => children.push((key, child)),
            other => {
                stray.insert(key, other);
            }
        }
    }

    let empty_block = children.is_empty() && !path.is_empty();
    if !stray.is_empty() || empty_block {
        out.push(RawStanza::new(path.clone(), stray, source));
    }
    for (key, child) in children {
        path.push(key);
        collect(child, path, source, out);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_level_tables_in_order() {
        let text = r#"
[shell.run.hello]
cmd = "echo"
args = ["hi"]

[apt.update.base]
packages = ["curl"]
"#;
        let stanzas = parse_document("base.toml", text).unwrap();
        let keys: Vec<String> = stanzas
            .iter()
            .map(|s| s.key().unwrap().to_string())
            .collect();
        assert_eq!(keys, ["shell.run.hello", "apt.update.base"]);
        assert_eq!(stanzas[0].attributes["cmd"].as_str(), Some("echo"));
        assert_eq!(stanzas[1].source, "base.toml");
    }

    #[test]
    fn dotted_headers_and_inline_tables_are_equivalent() {
        let text = r#"
apt.update = { base = { packages = ["curl"] } }
"#;
        let stanzas = parse_document("inline.toml", text).unwrap();
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].labels, ["apt", "update", "base"]);
    }

    #[test]
    fn stray_values_become_short_stanzas() {
        let text = r#"
[apt.update]
packages = ["curl"]
"#;
        let stanzas = parse_document("short.toml", text).unwrap();
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].labels, ["apt", "update"]);

        let err = stanzas[0].key().unwrap_err();
        assert!(matches!(err, Error::InvalidStanza { .. }));
        assert!(err.to_string().contains("apt.update"));
        assert!(err.to_string().contains("short.toml"));
    }

    #[test]
    fn empty_short_blocks_become_short_stanzas() {
        let text = r#"
[apt.update]

[shell.run.hello]
cmd = "echo"
"#;
        let stanzas = parse_document("short.toml", text).unwrap();
        let labels: Vec<String> = stanzas.iter().map(|s| s.labels.join(".")).collect();
        assert_eq!(labels, ["apt.update", "shell.run.hello"]);
        assert!(stanzas[0].attributes.is_empty());
        assert!(matches!(
            stanzas[0].key(),
            Err(Error::InvalidStanza { ref labels, .. }) if labels == "apt.update"
        ));

        let stanzas = parse_document("kind.toml", "[apt]
").unwrap();
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].labels, ["apt"]);
    }

    #[test]
    fn empty_document_has_no_stanzas() {
        assert!(parse_document("empty.toml", "").unwrap().is_empty());
        assert!(parse_document("comments.toml", "# nothing yet
").unwrap().is_empty());
    }

    #[test]
    fn deeper_tables_stay_attributes() {
        let text = r#"
[shell.run.hello]
cmd = "echo"

[shell.run.hello.extra]
flag = true
"#;
        let stanzas = parse_document("deep.toml", text).unwrap();
        assert_eq!(stanzas.len(), 1);
        assert!(stanzas[0].attributes["extra"].is_table());
    }

    #[test]
    fn syntax_errors_name_the_document() {
        let err = parse_document("broken.toml", "[apt.update.base\n").unwrap_err();
        assert!(matches!(err, Error::Parse { ref source_name, .. } if source_name == "broken.toml"));
    }

    #[test]
    fn identifiers_strip_separators() {
        assert_eq!(dependency_identifier("apt.update.base"), "aptupdatebase");
        assert_eq!(
            ResourceKey::new("apt", "update", "base").identifier(),
            dependency_identifier("apt.update.base")
        );
        assert_eq!(Node::Root.identifier(), ".");
        assert_ne!(dependency_identifier("."), Node::Root.identifier());
        assert_ne!(dependency_identifier(".."), Node::Root.identifier());
        assert_eq!(Node::Root.to_string(), "root");
    }
}
