//! Device tree and device files
//!
//! Groups nest by address segment; leaves are devices holding one `Value`.
//! A device keeps the kind of the value it was created with.
//!
//! Device files are TOML with a `[devices]` table. Keys are dotted addresses,
//! either quoted (`"porch.light" = "off"`) or as nested tables
//! (`[devices.porch]` then `light = "off"`). String values go through the
//! language scanner, so `"15m"` is a duration and `"07:30"` a time.

use hearth_dsl::evaluation::value::Value;
use hearth_dsl::evaluation::{DeviceAddress, PathPattern, StoreError};
use hearth_dsl::grammar::ast::nodes::{PathSegment, ValueKind};
use hearth_dsl::logging::{codes, Code};
use hearth_dsl::tokens::{Token, TokenKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DeviceFileError {
    #[error("cannot read device file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid device file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid device address '{address}'")]
    InvalidAddress { address: String },

    /// Keywords, numbers and other non-words can never appear in a path
    #[error("device address '{address}': segment '{segment}' is not a plain word")]
    UnaddressableSegment { address: String, segment: String },

    #[error("device '{address}': {message}")]
    InvalidValue { address: String, message: String },

    /// A device and a group would share one address
    #[error("'{address}' is both a device and a group")]
    Conflict { address: String },
}

impl DeviceFileError {
    pub fn error_code(&self) -> Code {
        codes::dispatch::DEVICE_FILE_ERROR
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Group(BTreeMap<String, Entry>),
    Device(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceTree {
    root: BTreeMap<String, Entry>,
    devices: usize,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.devices == 0
    }

    /// Add a device, or replace the value of an existing one
    pub fn insert(&mut self, address: &DeviceAddress, value: Value) -> Result<(), DeviceFileError> {
        let conflict = || DeviceFileError::Conflict {
            address: address.to_string(),
        };

        let Some((leaf, groups)) = address.segments().split_last() else {
            return Err(DeviceFileError::InvalidAddress {
                address: address.to_string(),
            });
        };

        let mut level = &mut self.root;
        for segment in groups {
            let entry = level
                .entry(segment.clone())
                .or_insert_with(|| Entry::Group(BTreeMap::new()));
            level = match entry {
                Entry::Group(children) => children,
                Entry::Device(_) => return Err(conflict()),
            };
        }

        match level.get_mut(leaf) {
            Some(Entry::Group(_)) => Err(conflict()),
            Some(Entry::Device(current)) => {
                *current = value;
                Ok(())
            }
            None => {
                level.insert(leaf.clone(), Entry::Device(value));
                self.devices += 1;
                Ok(())
            }
        }
    }

    /// Every device address matching `pattern`, in address order
    pub fn resolve(&self, pattern: &PathPattern) -> Vec<DeviceAddress> {
        let mut found = Vec::new();
        collect(&self.root, pattern.segments(), &mut Vec::new(), &mut found);
        found
    }

    pub fn read(&self, address: &DeviceAddress) -> Result<Value, StoreError> {
        self.device(address)
            .cloned()
            .ok_or_else(|| not_found(address))
    }

    /// Replace a device's value, keeping its kind. Returns the old value.
    pub fn write(&mut self, address: &DeviceAddress, value: Value) -> Result<Value, StoreError> {
        let current = self
            .device_mut(address)
            .ok_or_else(|| not_found(address))?;

        if current.kind() != value.kind() {
            return Err(StoreError::TypeMismatch {
                address: address.to_string(),
                expected: current.kind(),
                found: value.kind(),
            });
        }

        Ok(std::mem::replace(current, value))
    }

    /// All device addresses in order
    pub fn addresses(&self) -> Vec<DeviceAddress> {
        let mut found = Vec::new();
        walk(&self.root, &mut Vec::new(), &mut found);
        found
    }

    fn device(&self, address: &DeviceAddress) -> Option<&Value> {
        let (leaf, groups) = address.segments().split_last()?;
        let mut level = &self.root;
        for segment in groups {
            match level.get(segment)? {
                Entry::Group(children) => level = children,
                Entry::Device(_) => return None,
            }
        }
        match level.get(leaf)? {
            Entry::Device(value) => Some(value),
            Entry::Group(_) => None,
        }
    }

    fn device_mut(&mut self, address: &DeviceAddress) -> Option<&mut Value> {
        let (leaf, groups) = address.segments().split_last()?;
        let mut level = &mut self.root;
        for segment in groups {
            match level.get_mut(segment)? {
                Entry::Group(children) => level = children,
                Entry::Device(_) => return None,
            }
        }
        match level.get_mut(leaf)? {
            Entry::Device(value) => Some(value),
            Entry::Group(_) => None,
        }
    }

    // === DEVICE FILES ===

    pub fn from_toml_str(text: &str) -> Result<Self, DeviceFileError> {
        #[derive(Deserialize)]
        struct DeviceFile {
            #[serde(default)]
            devices: toml::Table,
        }

        let file: DeviceFile = toml::from_str(text)?;
        let mut tree = Self::new();
        load_table(&mut tree, &file.devices, &mut Vec::new())?;
        Ok(tree)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeviceFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DeviceFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let tree = Self::from_toml_str(&text)?;
        hearth_dsl::log_success!(
            codes::success::DEVICES_LOADED,
            "Device file loaded",
            "path" => path.display(),
            "devices" => tree.len()
        );
        Ok(tree)
    }
}

fn not_found(address: &DeviceAddress) -> StoreError {
    StoreError::NotFound {
        address: address.to_string(),
    }
}

fn collect(
    level: &BTreeMap<String, Entry>,
    pattern: &[PathSegment],
    prefix: &mut Vec<String>,
    found: &mut Vec<DeviceAddress>,
) {
    let Some((head, rest)) = pattern.split_first() else {
        return;
    };

    let mut visit = |name: &String, entry: &Entry| {
        prefix.push(name.clone());
        match (entry, rest.is_empty()) {
            (Entry::Device(_), true) => found.push(DeviceAddress::new(prefix.clone())),
            (Entry::Group(children), false) => collect(children, rest, prefix, found),
            _ => {}
        }
        prefix.pop();
    };

    match head {
        PathSegment::Wildcard => level.iter().for_each(|(name, entry)| visit(name, entry)),
        PathSegment::Literal(word) => {
            if let Some((name, entry)) = level.get_key_value(word) {
                visit(name, entry);
            }
        }
    }
}

fn walk(level: &BTreeMap<String, Entry>, prefix: &mut Vec<String>, found: &mut Vec<DeviceAddress>) {
    for (name, entry) in level {
        prefix.push(name.clone());
        match entry {
            Entry::Device(_) => found.push(DeviceAddress::new(prefix.clone())),
            Entry::Group(children) => walk(children, prefix, found),
        }
        prefix.pop();
    }
}

fn load_table(
    tree: &mut DeviceTree,
    table: &toml::Table,
    prefix: &mut Vec<String>,
) -> Result<(), DeviceFileError> {
    for (key, item) in table {
        let Some(key_address) = DeviceAddress::parse(key) else {
            return Err(DeviceFileError::InvalidAddress {
                address: join(prefix, key),
            });
        };

        if let Some(segment) = key_address
            .segments()
            .iter()
            .find(|segment| !is_addressable(segment))
        {
            return Err(DeviceFileError::UnaddressableSegment {
                address: join(prefix, key),
                segment: segment.clone(),
            });
        }

        let depth = prefix.len();
        prefix.extend(key_address.segments().iter().cloned());

        let result = match item {
            toml::Value::Table(children) => load_table(tree, children, prefix),
            other => {
                let address = DeviceAddress::new(prefix.clone());
                device_value(&address, other).and_then(|value| tree.insert(&address, value))
            }
        };

        prefix.truncate(depth);
        result?;
    }
    Ok(())
}

fn join(prefix: &[String], key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix.join("."), key)
    }
}

fn device_value(address: &DeviceAddress, item: &toml::Value) -> Result<Value, DeviceFileError> {
    let invalid = |message: String| DeviceFileError::InvalidValue {
        address: address.to_string(),
        message,
    };

    match item {
        toml::Value::Integer(n) => Ok(Value::Number(*n as f64)),
        toml::Value::Float(n) => Ok(Value::Number(*n)),
        toml::Value::String(text) => literal_value(text).map_err(invalid),
        other => Err(invalid(format!(
            "unsupported {} value, use a number or a string",
            other.type_str()
        ))),
    }
}

/// A segment is addressable when the scanner reads it back as one word
fn is_addressable(segment: &str) -> bool {
    let mut tokens = hearth_dsl::scan(segment);
    matches!(
        (tokens.next(), tokens.next()),
        (Some(word), Some(end))
            if word.kind == TokenKind::Word
                && word.text == segment
                && end.kind == TokenKind::EndOfInput
    )
}

/// Classify a string the way the scanner classifies a literal
fn literal_value(text: &str) -> Result<Value, String> {
    let tokens: Vec<Token> = hearth_dsl::scan(text)
        .filter(|token| token.kind != TokenKind::EndOfInput)
        .collect();

    let kind = match tokens.as_slice() {
        [token] => match token.kind {
            TokenKind::Number => ValueKind::Number,
            TokenKind::Time => ValueKind::Time,
            TokenKind::Duration => ValueKind::Duration,
            TokenKind::Word => ValueKind::Word,
            TokenKind::Error => return Err(token.text.clone()),
            _ => return Err(format!("'{}' is not a literal value", text)),
        },
        _ => {
            return Err(format!(
                "'{}' must be a single number, time, duration or word",
                text
            ))
        }
    };

    Value::from_literal(kind, &tokens[0].text)
}
