//! Runtime validation of capability calls against their declared schema.

use regex::Regex;
use serde_json::Value;

use crate::errors::*;
use crate::types::{Arg, Capability, Output, Validation, ValueType};

/// Validates argument vectors and output values against a [`Capability`]'s
/// declared schema.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validates a positional argument vector against
    /// `capability.arguments`, checking required arguments before optional:
    /// arity check, then required arguments left to right, then optional
    /// arguments that were actually supplied.
    pub fn validate_arguments(capability: &Capability, args: &[Value]) -> Result<(), ManifestError> {
        capability.validate_schema()?;

        let required = &capability.arguments.required;
        let optional = &capability.arguments.optional;
        let max = required.len() + optional.len();
        if args.len() > max {
            return TooManyArgumentsSnafu {
                provided: args.len(),
                max,
            }
            .fail();
        }

        for (i, arg_def) in required.iter().enumerate() {
            if i >= args.len() {
                return MissingRequiredArgumentSnafu {
                    name: arg_def.name.clone(),
                }
                .fail();
            }
            validate_argument(arg_def, &args[i])?;
        }

        let required_count = required.len();
        for (j, arg_def) in optional.iter().enumerate() {
            let idx = required_count + j;
            if idx < args.len() {
                validate_argument(arg_def, &args[idx])?;
            }
        }

        Ok(())
    }

    /// Validates a non-binary output value against `capability.output`.
    /// Fails with [`ManifestError::InvalidCapabilitySchema`] if the
    /// capability declares no output at all.
    pub fn validate_output(capability: &Capability, value: &Value) -> Result<(), ManifestError> {
        let output = require_output(capability)?;
        if !value_matches_type(output.output_type, value) {
            return InvalidOutputTypeSnafu {
                expected: format!("{:?}", output.output_type),
            }
            .fail();
        }
        if let Some(rule) = &output.validation {
            check_value_rules(value, rule).map_err(|(rule, value)| {
                ManifestError::OutputValidationFailed { rule, value }
            })?;
        }
        Ok(())
    }

    /// Validates a binary output's raw bytes. Skips string rules and
    /// applies `min`/`max` as byte-length bounds.
    pub fn validate_output_binary(capability: &Capability, bytes: &[u8]) -> Result<(), ManifestError> {
        let output = require_output(capability)?;
        if output.output_type != ValueType::Binary {
            return InvalidOutputTypeSnafu {
                expected: "binary".to_string(),
            }
            .fail();
        }
        if let Some(rule) = &output.validation {
            let len = bytes.len() as f64;
            if let Some(min) = rule.min {
                if len < min {
                    return OutputValidationFailedSnafu {
                        rule: format!("min={min}"),
                        value: bytes.len().to_string(),
                    }
                    .fail();
                }
            }
            if let Some(max) = rule.max {
                if len > max {
                    return OutputValidationFailedSnafu {
                        rule: format!("max={max}"),
                        value: bytes.len().to_string(),
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }
}

fn require_output(capability: &Capability) -> Result<&Output, ManifestError> {
    capability.output.as_ref().ok_or_else(|| {
        ManifestError::InvalidCapabilitySchema {
            argument: "output".to_string(),
            reason: "capability declares no output".to_string(),
        }
    })
}

fn validate_argument(arg_def: &Arg, value: &Value) -> Result<(), ManifestError> {
    if !value_matches_type(arg_def.arg_type, value) {
        return InvalidArgumentTypeSnafu {
            name: arg_def.name.clone(),
            expected: format!("{:?}", arg_def.arg_type),
        }
        .fail();
    }
    if let Some(rule) = &arg_def.validation {
        check_value_rules(value, rule)
            .map_err(|(rule, value)| ManifestError::ArgumentValidationFailed {
                name: arg_def.name.clone(),
                rule,
                value,
            })?;
    }
    Ok(())
}

/// `integer` additionally rejects booleans and float-typed numbers, since
/// `serde_json` only reports `is_i64`/`is_u64` for numbers parsed without a
/// decimal point or exponent.
fn value_matches_type(expected: ValueType, value: &Value) -> bool {
    match expected {
        ValueType::String | ValueType::Binary => value.is_string(),
        ValueType::Integer => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        ValueType::Number => value.is_number(),
        ValueType::Boolean => value.is_boolean(),
        ValueType::Array => value.is_array(),
        ValueType::Object => value.is_object(),
    }
}

/// Shared rule checker: numeric bounds apply to numbers, length bounds and
/// pattern/allow-list apply to strings. Returns `(rule, value)` on failure
/// so callers can wrap it in the argument- or output-flavored error.
fn check_value_rules(value: &Value, rule: &Validation) -> Result<(), (String, String)> {
    if let Some(n) = value.as_f64() {
        if let Some(min) = rule.min {
            if n < min {
                return Err((format!("min={min}"), value.to_string()));
            }
        }
        if let Some(max) = rule.max {
            if n > max {
                return Err((format!("max={max}"), value.to_string()));
            }
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(min_length) = rule.min_length {
            if s.len() < min_length {
                return Err((format!("minLength={min_length}"), value.to_string()));
            }
        }
        if let Some(max_length) = rule.max_length {
            if s.len() > max_length {
                return Err((format!("maxLength={max_length}"), value.to_string()));
            }
        }
        // A pattern that fails to compile is silently ignored; this matches
        // the reference behavior and must not
        // be upgraded into a hard error.
        if let Some(pattern) = &rule.pattern {
            if let Ok(re) = Regex::new(pattern) {
                if !re.is_match(s) {
                    return Err((format!("pattern={pattern}"), value.to_string()));
                }
            }
        }
        if let Some(allowed) = &rule.allowed_values {
            if !allowed.iter().any(|v| v == s) {
                return Err(("allowedValues".to_string(), value.to_string()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arguments, Manifest};
    use capkey::CapKey;
    use serde_json::json;
    use std::collections::HashMap;

    fn cap_with(required: Vec<Arg>, optional: Vec<Arg>, output: Option<Output>) -> Capability {
        Capability {
            key: CapKey::parse("action=transform;type=data_processing").unwrap(),
            version: "1.0.0".to_string(),
            command: "transform".to_string(),
            description: None,
            metadata: HashMap::new(),
            accepts_stdin: false,
            arguments: Arguments { required, optional },
            output,
        }
    }

    fn str_arg(name: &str, validation: Option<Validation>) -> Arg {
        Arg {
            name: name.to_string(),
            arg_type: ValueType::String,
            description: None,
            position: Some(0),
            cli_flag: None,
            validation,
            default_value: None,
        }
    }

    #[test]
    fn missing_required_argument() {
        let cap = cap_with(vec![str_arg("path", None)], vec![], None);
        let err = SchemaValidator::validate_arguments(&cap, &[]).unwrap_err();
        assert!(matches!(err, ManifestError::MissingRequiredArgument { .. }));
    }

    #[test]
    fn too_many_arguments() {
        let cap = cap_with(vec![str_arg("path", None)], vec![], None);
        let err =
            SchemaValidator::validate_arguments(&cap, &[json!("a"), json!("b")]).unwrap_err();
        assert!(matches!(err, ManifestError::TooManyArguments { .. }));
    }

    #[test]
    fn wrong_type_rejected() {
        let cap = cap_with(vec![str_arg("path", None)], vec![], None);
        let err = SchemaValidator::validate_arguments(&cap, &[json!(42)]).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidArgumentType { .. }));
    }

    #[test]
    fn integer_rejects_float_and_bool() {
        let mut arg = str_arg("count", None);
        arg.arg_type = ValueType::Integer;
        let cap = cap_with(vec![arg], vec![], None);

        assert!(SchemaValidator::validate_arguments(&cap, &[json!(3.5)]).is_err());
        assert!(SchemaValidator::validate_arguments(&cap, &[json!(true)]).is_err());
        assert!(SchemaValidator::validate_arguments(&cap, &[json!(3)]).is_ok());
    }

    #[test]
    fn pattern_rule_enforced() {
        let arg = str_arg(
            "path",
            Some(Validation {
                pattern: Some(r"^/[a-z]+$".to_string()),
                ..Default::default()
            }),
        );
        let cap = cap_with(vec![arg], vec![], None);

        assert!(SchemaValidator::validate_arguments(&cap, &[json!("/tmp")]).is_ok());
        let err = SchemaValidator::validate_arguments(&cap, &[json!("TMP")]).unwrap_err();
        assert!(matches!(err, ManifestError::ArgumentValidationFailed { .. }));
    }

    #[test]
    fn invalid_pattern_is_silently_ignored() {
        let arg = str_arg(
            "path",
            Some(Validation {
                pattern: Some("(unclosed".to_string()),
                ..Default::default()
            }),
        );
        let cap = cap_with(vec![arg], vec![], None);
        assert!(SchemaValidator::validate_arguments(&cap, &[json!("anything")]).is_ok());
    }

    #[test]
    fn allowed_values_enforced() {
        let arg = str_arg(
            "format",
            Some(Validation {
                allowed_values: Some(vec!["json".to_string(), "xml".to_string()]),
                ..Default::default()
            }),
        );
        let cap = cap_with(vec![arg], vec![], None);
        assert!(SchemaValidator::validate_arguments(&cap, &[json!("json")]).is_ok());
        assert!(SchemaValidator::validate_arguments(&cap, &[json!("yaml")]).is_err());
    }

    #[test]
    fn output_requires_declaration() {
        let cap = cap_with(vec![], vec![], None);
        let err = SchemaValidator::validate_output(&cap, &json!("x")).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidCapabilitySchema { .. }));
    }

    #[test]
    fn binary_output_checks_byte_length() {
        let output = Output {
            output_type: ValueType::Binary,
            schema_ref: None,
            content_type: None,
            validation: Some(Validation {
                max: Some(4.0),
                ..Default::default()
            }),
            description: None,
        };
        let cap = cap_with(vec![], vec![], Some(output));
        assert!(SchemaValidator::validate_output_binary(&cap, b"abcd").is_ok());
        assert!(SchemaValidator::validate_output_binary(&cap, b"abcde").is_err());
    }

    #[test]
    fn schema_self_check_rejects_duplicate_cli_flag() {
        let mut a = str_arg("a", None);
        a.cli_flag = Some("--in".to_string());
        a.position = Some(0);
        let mut b = str_arg("b", None);
        b.cli_flag = Some("--in".to_string());
        b.position = Some(1);
        let cap = cap_with(vec![a, b], vec![], None);
        assert!(SchemaValidator::validate_arguments(&cap, &[json!("x"), json!("y")]).is_err());
    }

    #[test]
    fn manifest_round_trip_via_cbor() {
        let cap = cap_with(vec![str_arg("path", None)], vec![], None);
        let manifest = Manifest {
            name: "demo".to_string(),
            version: "0.1.0".to_string(),
            description: "demo plugin".to_string(),
            author: None,
            caps: vec![cap],
        };
        let bytes = manifest.to_cbor_bytes().unwrap();
        let decoded = Manifest::from_cbor_bytes(&bytes).unwrap();
        assert_eq!(decoded.name, manifest.name);
        assert_eq!(decoded.caps.len(), 1);
        assert_eq!(decoded.caps[0].key, manifest.caps[0].key);
    }
}
