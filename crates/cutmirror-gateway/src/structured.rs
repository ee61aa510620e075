//! Structured output validation.
//!
//! Raw model text is checked for required fields before it is decoded, so a
//! response missing `segments[].end` is reported as malformed rather than
//! silently defaulted.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::TaskKind;

/// A type the reasoning service is asked to return as JSON.
pub trait StructuredOutput: DeserializeOwned + Serialize + JsonSchema + Send + 'static {
    const TASK: TaskKind;

    /// Field paths that must be present and non-null. `a[].b` requires `b`
    /// on every element of array `a`.
    const REQUIRED_FIELDS: &'static [&'static str];

    /// Semantic checks after decoding. The error text is fed back to the
    /// service in the corrective retry.
    fn post_validate(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn schema_json() -> String {
        let schema = schemars::schema_for!(Self);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum Validated<T> {
    Valid(T),
    Malformed { reason: String, raw: String },
}

impl<T> Validated<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validated::Valid(_))
    }
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse, check required fields, decode and post-validate.
pub fn validate<T: StructuredOutput>(raw: &str) -> Validated<T> {
    let malformed = |reason: String| Validated::Malformed {
        reason,
        raw: raw.to_string(),
    };

    let value: Value = match serde_json::from_str(strip_code_fences(raw)) {
        Ok(v) => v,
        Err(e) => return malformed(format!("response is not valid JSON: {}", e)),
    };

    for path in T::REQUIRED_FIELDS {
        if let Err(missing) = check_path(&value, path) {
            return malformed(format!("missing required field `{}`", missing));
        }
    }

    match serde_json::from_value::<T>(value) {
        Ok(mut decoded) => match decoded.post_validate() {
            Ok(()) => Validated::Valid(decoded),
            Err(reason) => malformed(reason),
        },
        Err(e) => malformed(format!("response does not match schema: {}", e)),
    }
}

fn check_path(value: &Value, path: &str) -> Result<(), String> {
    fn walk(value: &Value, parts: &[&str], trail: String) -> Result<(), String> {
        let Some((head, rest)) = parts.split_first() else {
            return Ok(());
        };
        let (name, is_array) = match head.strip_suffix("[]") {
            Some(name) => (name, true),
            None => (*head, false),
        };
        let here = if trail.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", trail, name)
        };
        let field = match value.get(name) {
            Some(Value::Null) | None => return Err(here),
            Some(field) => field,
        };
        if is_array {
            let Value::Array(items) = field else {
                return Err(here);
            };
            for (i, item) in items.iter().enumerate() {
                walk(item, rest, format!("{}[{}]", here, i))?;
            }
            Ok(())
        } else {
            walk(field, rest, here)
        }
    }

    let parts: Vec<&str> = path.split('.').collect();
    walk(value, &parts, String::new())
}
