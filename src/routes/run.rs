//! The question-answering run endpoint

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::reasoner::Answer;

use super::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RunRequest {
    /// URL of the document to answer from
    #[validate(length(min = 1, message = "documents must not be empty"))]
    pub documents: String,

    /// Questions to answer against the document
    pub questions: Vec<String>,

    /// When set, the response carries full per-answer detail alongside
    /// the plain answer strings
    #[serde(default)]
    pub include_details: bool,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub answers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed: Option<Vec<Answer>>,
}

pub async fn run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>> {
    payload.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    info!(
        document = %payload.documents,
        questions = payload.questions.len(),
        "Run requested"
    );

    let answers = state
        .pipeline
        .run(&payload.documents, &payload.questions)
        .await?;

    let answer_texts = answers.iter().map(|a| a.answer_text.clone()).collect();

    Ok(Json(RunResponse {
        answers: answer_texts,
        detailed: payload.include_details.then_some(answers),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_without_details_flag() {
        let payload: RunRequest = serde_json::from_str(
            r#"{"documents": "https://example.com/doc.pdf", "questions": ["q1", "q2"]}"#,
        )
        .unwrap();
        assert_eq!(payload.questions.len(), 2);
        assert!(!payload.include_details);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_empty_document_url_fails_validation() {
        let payload: RunRequest =
            serde_json::from_str(r#"{"documents": "", "questions": []}"#).unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_response_omits_detail_by_default() {
        let response = RunResponse {
            answers: vec!["yes".to_string()],
            detailed: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["answers"][0], "yes");
        assert!(json.get("detailed").is_none());
    }
}
