//! Structural validation of the analysis service's JSON envelope.
//!
//! The upstream is a workflow webhook, so its payload is treated as an opaque
//! `serde_json::Value` and checked field by field before any typed
//! `AnalysisResult` exists. Unknown fields are ignored.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::analysis::{AnalysisResult, ExperienceComparison, LocationComparison};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("response body is not valid JSON: {0}")]
    NotJson(String),

    #[error("expected a non-empty array")]
    NotNonEmptyArray,

    #[error("first array element must be an object")]
    FirstItemNotObject,

    #[error("missing output field")]
    MissingOutput,

    #[error("field `{path}` must be {expected}")]
    InvalidField { path: String, expected: &'static str },
}

/// Validates `raw` and builds the typed result, keeping `raw` for diagnostics.
pub fn validate_envelope(raw: Value) -> Result<AnalysisResult, ShapeError> {
    let first = match raw.as_array().and_then(|items| items.first()) {
        Some(first) => first,
        None => return Err(ShapeError::NotNonEmptyArray),
    };

    let item = first.as_object().ok_or(ShapeError::FirstItemNotObject)?;

    let output = item
        .get("output")
        .filter(|v| is_truthy(v))
        .ok_or(ShapeError::MissingOutput)?;
    let output = object(output, "output")?;

    let result = AnalysisResult {
        match_score: number(output, "output", "matchScore")?,
        matching_skills: string_list(output, "output", "matchingSkills")?,
        missing_skills: string_list(output, "output", "missingSkills")?,
        location_comparison: location_comparison(output)?,
        experience_comparison: experience_comparison(output)?,
        suggestions: string_list(output, "output", "suggestions")?,
        raw_response: Value::Null,
    };

    Ok(AnalysisResult {
        raw_response: raw,
        ..result
    })
}

fn location_comparison(output: &Map<String, Value>) -> Result<LocationComparison, ShapeError> {
    let path = "output.locationComparison";
    let obj = object(field(output, "locationComparison"), path)?;

    Ok(LocationComparison {
        resume_location: string(obj, path, "resumeLocation")?,
        job_location: string(obj, path, "jobLocation")?,
        is_match: boolean(obj, path, "isMatch")?,
        notes: string(obj, path, "notes")?,
    })
}

fn experience_comparison(
    output: &Map<String, Value>,
) -> Result<ExperienceComparison, ShapeError> {
    let path = "output.experienceComparison";
    let obj = object(field(output, "experienceComparison"), path)?;

    Ok(ExperienceComparison {
        resume_years: number(obj, path, "resumeYears")?,
        required_years: number(obj, path, "requiredYears")?,
        meets_requirement: boolean(obj, path, "meetsRequirement")?,
        notes: string(obj, path, "notes")?,
    })
}

/// JavaScript truthiness, which is what the webhook's producers assume.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a Value {
    obj.get(key).unwrap_or(&Value::Null)
}

fn invalid(path: &str, key: &str, expected: &'static str) -> ShapeError {
    ShapeError::InvalidField {
        path: format!("{path}.{key}"),
        expected,
    }
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ShapeError> {
    value.as_object().ok_or_else(|| ShapeError::InvalidField {
        path: path.to_string(),
        expected: "an object",
    })
}

fn number(obj: &Map<String, Value>, path: &str, key: &str) -> Result<f64, ShapeError> {
    field(obj, key)
        .as_f64()
        .ok_or_else(|| invalid(path, key, "a number"))
}

fn boolean(obj: &Map<String, Value>, path: &str, key: &str) -> Result<bool, ShapeError> {
    field(obj, key)
        .as_bool()
        .ok_or_else(|| invalid(path, key, "a boolean"))
}

fn string(obj: &Map<String, Value>, path: &str, key: &str) -> Result<String, ShapeError> {
    field(obj, key)
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(path, key, "a string"))
}

fn string_list(obj: &Map<String, Value>, path: &str, key: &str) -> Result<Vec<String>, ShapeError> {
    let items = field(obj, key)
        .as_array()
        .ok_or_else(|| invalid(path, key, "an array of strings"))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(path, key, "an array of strings"))
        })
        .collect()
}
