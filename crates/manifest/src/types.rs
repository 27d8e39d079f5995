//! Data shapes this core preserves: capability records, their argument and
//! output schemas, and the manifest that groups them for one plugin.

use std::collections::HashMap;

use capkey::CapKey;
use serde::{Deserialize, Serialize};

/// The primitive value types an [`Arg`] or [`Output`] can declare.
///
/// Arguments and outputs share one type set: a schema validator that
/// treats binary arguments as base64 strings needs `Binary` available on
/// both sides, so this is one shared enum rather than two narrower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Binary,
}

/// Numeric/string/enum constraints applied after type-checking.
///
/// A `pattern` that fails to compile is silently ignored rather than
/// rejected — this mirrors reference behavior and must not be "fixed"
/// into a hard error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Validation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
}

/// One declared capability argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

/// A capability's declared output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "type")]
    pub output_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The required/optional argument vectors a [`Capability`] declares.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub required: Vec<Arg>,
    #[serde(default)]
    pub optional: Vec<Arg>,
}

/// A single operation a plugin advertises: a capability key, the command
/// the plugin dispatches it to, and the argument/output schema the
/// `SchemaValidator` checks calls against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "id")]
    pub key: CapKey,
    pub version: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub accepts_stdin: bool,
    #[serde(default)]
    pub arguments: Arguments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
}

impl capkey::HasCapKey for Capability {
    fn cap_key(&self) -> &CapKey {
        &self.key
    }
}

impl Capability {
    /// (I5) no required argument declares a default; (I6) positional
    /// indices are unique across required+optional; (I7) CLI flags are
    /// unique across required+optional. Violation names the offending
    /// argument via [`super::ManifestError::InvalidCapabilitySchema`].
    pub fn validate_schema(&self) -> Result<(), super::ManifestError> {
        for arg in &self.arguments.required {
            if arg.default_value.is_some() {
                return super::InvalidCapabilitySchemaSnafu {
                    argument: arg.name.clone(),
                    reason: "required argument must not declare a default value".to_string(),
                }
                .fail();
            }
        }

        let all_args = self.arguments.required.iter().chain(self.arguments.optional.iter());
        let mut seen_positions = HashMap::new();
        let mut seen_flags = HashMap::new();
        for arg in all_args {
            if let Some(pos) = arg.position {
                if let Some(prev) = seen_positions.insert(pos, arg.name.clone()) {
                    return super::InvalidCapabilitySchemaSnafu {
                        argument: arg.name.clone(),
                        reason: format!("position {pos} already used by argument '{prev}'"),
                    }
                    .fail();
                }
            }
            if let Some(flag) = &arg.cli_flag {
                if let Some(prev) = seen_flags.insert(flag.clone(), arg.name.clone()) {
                    return super::InvalidCapabilitySchemaSnafu {
                        argument: arg.name.clone(),
                        reason: format!("CLI flag '{flag}' already used by argument '{prev}'"),
                    }
                    .fail();
                }
            }
        }

        Ok(())
    }
}

/// A named, versioned collection of capabilities for one plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Preserves declaration order for `caps`, independent of the ranking
    /// order `capkey::find_all` produces at match time.
    pub caps: Vec<Capability>,
}

impl Manifest {
    pub fn from_json(s: &str) -> Result<Self, super::ManifestError> {
        serde_json::from_str(s).map_err(|source| super::ManifestError::Json { source })
    }

    pub fn to_json(&self) -> Result<String, super::ManifestError> {
        serde_json::to_string_pretty(self).map_err(|source| super::ManifestError::Json { source })
    }

    /// Decodes a manifest from the opaque CBOR bytes a HELLO frame carries.
    pub fn from_cbor_bytes(bytes: &[u8]) -> Result<Self, super::ManifestError> {
        ciborium::de::from_reader(bytes).map_err(|source| super::ManifestError::Cbor {
            message: source.to_string(),
        })
    }

    /// Encodes the manifest into the bytes a plugin's HELLO frame carries.
    pub fn to_cbor_bytes(&self) -> Result<Vec<u8>, super::ManifestError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf).map_err(|source| super::ManifestError::Cbor {
            message: source.to_string(),
        })?;
        Ok(buf)
    }
}
