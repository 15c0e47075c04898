//! Configuration validation.
//!
//! Validates a `serde_json::Value` against a [`Schema`]: presence of required
//! attributes, value types, nested block cardinality, and the per-attribute
//! [`Validator`] checks (non-empty strings, allow-lists, storage account
//! names).
//!
//! # Example
//!
//! ```
//! use azureml_provider::schema::{Attribute, Schema};
//! use azureml_provider::validation::{validate, Validator};
//! use serde_json::json;
//!
//! let schema = Schema::v0().with_attribute(
//!     "storage_type",
//!     Attribute::required_string().with_validator(Validator::one_of(["AzureBlob", "AzureFile"])),
//! );
//!
//! assert!(validate(&schema, &json!({"storage_type": "AzureBlob"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"storage_type": "Ftp"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("storage_type".to_string()));
//! ```

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema};
use serde_json::Value;
use std::collections::BTreeMap;

/// Minimum length of an Azure storage account name.
pub const STORAGE_ACCOUNT_NAME_MIN_LENGTH: usize = 3;

/// Maximum length of an Azure storage account name.
pub const STORAGE_ACCOUNT_NAME_MAX_LENGTH: usize = 24;

/// A check applied to a configured string value.
///
/// Validators only run on non-null strings; whether the attribute must be
/// present is decided by its required flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// The value must contain at least one non-whitespace character.
    StringNotEmpty,
    /// The value must be one of the listed strings.
    OneOf(Vec<String>),
    /// The value must be a valid storage account name.
    StorageAccountName,
}

impl Validator {
    /// Build an allow-list validator.
    pub fn one_of<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(allowed.into_iter().map(Into::into).collect())
    }

    /// Run the check, returning an error diagnostic on failure.
    pub fn check(&self, path: &str, value: &str) -> Option<Diagnostic> {
        match self {
            Self::StringNotEmpty => {
                if value.trim().is_empty() {
                    return Some(invalid_value(path, "The value must be a non-empty string."));
                }
            }
            Self::OneOf(allowed) => {
                if !allowed.iter().any(|a| a == value) {
                    return Some(invalid_value(
                        path,
                        format!("Allowed values are: {}.", quoted_list(allowed)),
                    ));
                }
            }
            Self::StorageAccountName => {
                if value.trim().is_empty() {
                    return Some(invalid_value(path, "The value must be a non-empty string."));
                }
                let length = value.chars().count();
                if !(STORAGE_ACCOUNT_NAME_MIN_LENGTH..=STORAGE_ACCOUNT_NAME_MAX_LENGTH)
                    .contains(&length)
                {
                    return Some(invalid_value(
                        path,
                        format!(
                            "Storage account name must be between {} and {} characters.",
                            STORAGE_ACCOUNT_NAME_MIN_LENGTH, STORAGE_ACCOUNT_NAME_MAX_LENGTH
                        ),
                    ));
                }
                if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Some(invalid_value(
                        path,
                        "Storage account name can contain only letters and digits.",
                    ));
                }
            }
        }
        None
    }
}

/// Check `value` against `schema` and return every problem found.
///
/// Computed-only attributes are ignored, null counts as unset, and the
/// [`Validator`]s of an attribute only run once its type is right. An empty
/// result means the value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// [`validate`], as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diagnostic = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diagnostic = diagnostic.with_attribute(path);
            }
            diagnostics.push(diagnostic);
            return;
        }
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested_block) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested_block, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);

            // Value checks only make sense once the type is right.
            if diagnostics.len() == before {
                if let Some(s) = v.as_str() {
                    diagnostics.extend(attr.validators.iter().filter_map(|c| c.check(path, s)));
                }
            }
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        }
        AttributeType::Object(attrs) => {
            if let Some(obj) = value.as_object() {
                validate_object_type(attrs, obj, path, diagnostics);
            } else {
                diagnostics.push(type_error(path, "object", value));
            }
        }
    }
}

fn validate_object_type(
    attrs: &BTreeMap<String, AttributeType>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr_type) in attrs {
        let attr_path = join_path(path, name);
        match obj.get(name) {
            None | Some(Value::Null) => {}
            Some(value) => validate_attribute_type(attr_type, value, &attr_path, diagnostics),
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required block '{}'", path))
                        .with_detail("This block is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => validate_block(&nested.block, v, path, diagnostics),
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        ))
        .with_attribute(path)
}

fn invalid_value(path: &str, detail: impl Into<String>) -> Diagnostic {
    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
        .with_detail(detail)
        .with_attribute(path)
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "blobstore"})).is_empty());

        // Missing required
        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        // Null value
        assert_eq!(validate(&schema, &json!({"name": null})).len(), 1);

        // Wrong type
        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_optional_bool() {
        let schema = Schema::v0().with_attribute("is_default", Attribute::optional_bool());

        assert!(validate(&schema, &json!({"is_default": true})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"is_default": null})).is_empty());
        assert_eq!(validate(&schema, &json!({"is_default": "true"})).len(), 1);
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        // Even with wrong type, we don't validate computed-only attrs
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_string_not_empty_validator() {
        let schema = Schema::v0().with_attribute(
            "workspace_name",
            Attribute::required_string().with_validator(Validator::StringNotEmpty),
        );

        assert!(validate(&schema, &json!({"workspace_name": "ws"})).is_empty());

        let diagnostics = validate(&schema, &json!({"workspace_name": "   "}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("The value must be a non-empty string.")
        );
    }

    #[test]
    fn test_one_of_validator_lists_allowed_values() {
        let validator = Validator::one_of(["AccountKey", "ServicePrincipal"]);

        assert!(validator.check("auth.credentials_type", "AccountKey").is_none());

        let diagnostic = validator
            .check("auth.credentials_type", "Password")
            .expect("value outside the allow-list");
        assert_eq!(
            diagnostic.summary,
            "Invalid value for attribute 'auth.credentials_type'"
        );
        assert_eq!(
            diagnostic.detail.as_deref(),
            Some("Allowed values are: \"AccountKey\", \"ServicePrincipal\".")
        );
        assert_eq!(diagnostic.attribute.as_deref(), Some("auth.credentials_type"));
    }

    #[test]
    fn test_one_of_is_case_sensitive() {
        let validator = Validator::one_of(["AzureBlob"]);
        assert!(validator.check("storage_type", "azureblob").is_some());
    }

    #[test]
    fn test_storage_account_name_validator() {
        let validator = Validator::StorageAccountName;

        assert!(validator.check("storage_account_name", "abc").is_none());
        assert!(validator
            .check("storage_account_name", "mlworkspacestorage0123456")
            .is_some());
        assert!(validator
            .check("storage_account_name", "mlworkspacestorage012345")
            .is_none());

        let too_short = validator.check("storage_account_name", "ab").unwrap();
        assert!(too_short.detail.unwrap().contains("between 3 and 24"));

        let bad_chars = validator.check("storage_account_name", "ml-storage").unwrap();
        assert!(bad_chars.detail.unwrap().contains("only letters and digits"));

        let empty = validator.check("storage_account_name", "").unwrap();
        assert!(empty.detail.unwrap().contains("non-empty"));
    }

    #[test]
    fn test_validators_skip_null_optional_values() {
        let schema = Schema::v0().with_attribute(
            "storage_account_name",
            Attribute::optional_string().with_validator(Validator::StorageAccountName),
        );

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"storage_account_name": null})).is_empty());
    }

    #[test]
    fn test_validators_skip_wrong_types() {
        let schema = Schema::v0().with_attribute(
            "storage_type",
            Attribute::required_string().with_validator(Validator::one_of(["AzureBlob"])),
        );

        // Only the type error is reported
        let diagnostics = validate(&schema, &json!({"storage_type": 7}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_list_of_objects() {
        let schema = Schema::v0().with_attribute(
            "datastores",
            Attribute::new(
                AttributeType::list(AttributeType::object([
                    ("name", AttributeType::String),
                    ("is_default", AttributeType::Bool),
                ])),
                AttributeFlags::optional(),
            ),
        );

        let diagnostics = validate(
            &schema,
            &json!({"datastores": [{"name": "a", "is_default": true}, {"name": "b"}]}),
        );
        assert!(diagnostics.is_empty());

        let diagnostics = validate(
            &schema,
            &json!({"datastores": [{"name": "a"}, {"name": "b", "is_default": "no"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("datastores.1.is_default".to_string())
        );

        assert_eq!(validate(&schema, &json!({"datastores": "x"})).len(), 1);
    }

    #[test]
    fn test_validate_required_single_block() {
        let schema = Schema::v0().with_block(
            "auth",
            NestedBlock::required(Block::new().with_attribute(
                "credentials_type",
                Attribute::required_string().with_validator(Validator::one_of(["AccountKey", "None"])),
            )),
        );

        assert!(validate(&schema, &json!({"auth": {"credentials_type": "None"}})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required block 'auth'"));

        let diagnostics = validate(&schema, &json!({"auth": {"credentials_type": "Token"}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("auth.credentials_type".to_string())
        );

        let diagnostics = validate(&schema, &json!({"auth": ["not", "an", "object"]}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "storage_type",
                Attribute::required_string().with_validator(Validator::one_of(["AzureBlob"])),
            )
            .with_attribute("is_default", Attribute::optional_bool());

        let diagnostics = validate(
            &schema,
            &json!({"name": 123, "storage_type": "Ftp", "is_default": "yes"}),
        );
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate_result(&schema, &json!({"name": "test"})).is_ok());

        let result = validate_result(&schema, &json!({}));
        assert_eq!(result.unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert!(diagnostics[0].attribute.is_none());
    }
}
