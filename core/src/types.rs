use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Write bits in a file mode; any of them grants runtime write access.
const MODE_WRITE_BITS: u32 = 0o222;

/// Value kind declared by a module for one of its parameters, as reported
/// by the metadata tool. Parameters without metadata stay [`Unknown`] and
/// are still editable as free-form text.
///
/// [`Unknown`]: ParameterType::Unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Integer,
    Boolean,
    Text,
    Charp,
    #[default]
    Unknown,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterType::Integer => "int",
            ParameterType::Boolean => "bool",
            ParameterType::Text => "string",
            ParameterType::Charp => "charp",
            ParameterType::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Whether a live parameter accepts runtime writes. Derived from the raw
/// mode bits observed at scan time, never from metadata or configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionClass {
    ReadWrite,
    ReadOnly,
}

impl PermissionClass {
    /// Classifies a file mode: any write bit set means writable.
    pub fn from_mode(mode: u32) -> Self {
        if mode & MODE_WRITE_BITS != 0 {
            PermissionClass::ReadWrite
        } else {
            PermissionClass::ReadOnly
        }
    }

    pub fn is_writable(self) -> bool {
        self == PermissionClass::ReadWrite
    }
}

impl fmt::Display for PermissionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionClass::ReadWrite => "rw",
            PermissionClass::ReadOnly => "ro",
        };
        f.write_str(label)
    }
}

/// Identity of one parameter: owning module name plus parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId {
    pub module: String,
    pub name: String,
}

impl ParamId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Live state of one parameter, produced by a single read of its sysfs
/// file. `value` is `None` when the file exists but its content could not
/// be read (write-only parameters, kernel read errors); the permission
/// class is always present for a listed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub value: Option<String>,
    pub permission: PermissionClass,
}
