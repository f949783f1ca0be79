//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and callers independently.

use serde::Serialize;

use crate::domain::{GeneratedTest, PipelineResult};

/// Envelope returned by the generate endpoint. Failed runs carry
/// `success: false` and a human-readable `error`; callers surface it as a
/// single message and may retry the same files.
#[derive(Debug, Serialize)]
pub struct GenerateOut {
    pub success: bool,
    pub tests: Vec<GeneratedTest>,
    pub concepts: Vec<String>,
    #[serde(rename = "extractedText")]
    pub extracted_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateOut {
    pub fn ok(result: PipelineResult) -> Self {
        Self {
            success: true,
            tests: result.tests,
            concepts: result.concepts,
            extracted_text: result.text_preview,
            error: None,
        }
    }

    pub fn fail(message: String) -> Self {
        Self {
            success: false,
            tests: Vec::new(),
            concepts: Vec::new(),
            extracted_text: String::new(),
            error: Some(message),
        }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_has_no_partial_results() {
        let out = GenerateOut::fail("question generation failed".into());
        assert!(!out.success);
        assert!(out.tests.is_empty());
        let json = serde_json::to_value(&out).expect("serialize");
        assert_eq!(json["error"], "question generation failed");
        assert_eq!(json["extractedText"], "");
    }

    #[test]
    fn success_envelope_omits_the_error_field() {
        let out = GenerateOut::ok(PipelineResult {
            tests: Vec::new(),
            concepts: vec!["Fractions".into()],
            text_preview: "preview".into(),
        });
        let json = serde_json::to_value(&out).expect("serialize");
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }
}
