use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The caller-supplied pair sent for analysis. Also the upstream request body,
/// which is why the field names serialize as camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub resume_text: String,
    pub job_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationComparison {
    pub resume_location: String,
    pub job_location: String,
    pub is_match: bool,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceComparison {
    pub resume_years: f64,
    pub required_years: f64,
    pub meets_requirement: bool,
    pub notes: String,
}

/// A structurally verified analysis. Only `analysis::envelope::validate_envelope`
/// builds these from upstream data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub match_score: f64, // 0 – 100, fractional allowed
    pub matching_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub location_comparison: LocationComparison,
    pub experience_comparison: ExperienceComparison,
    pub suggestions: Vec<String>,
    /// Full upstream payload, kept for diagnostics.
    pub raw_response: Value,
}

/// Coarse bucket for a match score, using the rounded score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    High,
    Medium,
    Low,
}

impl MatchTier {
    pub fn from_score(score: f64) -> Self {
        let rounded = score.round();
        if rounded >= 75.0 {
            MatchTier::High
        } else if rounded >= 50.0 {
            MatchTier::Medium
        } else {
            MatchTier::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_from_camel_case() {
        let json = r#"{"resumeText": "Rust engineer", "jobDescription": "Needs Rust"}"#;
        let request: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.resume_text, "Rust engineer");
        assert_eq!(request.job_description, "Needs Rust");
    }

    #[test]
    fn test_request_serializes_upstream_field_names() {
        let request = AnalysisRequest {
            resume_text: "cv".to_string(),
            job_description: "jd".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["resumeText"], "cv");
        assert_eq!(value["jobDescription"], "jd");
    }

    #[test]
    fn test_match_tier_thresholds() {
        assert_eq!(MatchTier::from_score(100.0), MatchTier::High);
        assert_eq!(MatchTier::from_score(74.5), MatchTier::High);
        assert_eq!(MatchTier::from_score(74.4), MatchTier::Medium);
        assert_eq!(MatchTier::from_score(50.0), MatchTier::Medium);
        assert_eq!(MatchTier::from_score(49.4), MatchTier::Low);
        assert_eq!(MatchTier::from_score(0.0), MatchTier::Low);
    }

    #[test]
    fn test_match_tier_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MatchTier::Medium).unwrap(),
            r#""medium""#
        );
    }
}
