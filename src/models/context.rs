use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::query::ParsedQuery;
use crate::models::result::Citation;
use crate::models::table::ColumnRole;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Uuid,
    pub query: String, // the user's question
    #[serde(default)]
    pub include_prompt: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDatasetRequest {
    pub name: Option<String>,
    pub csv: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Ok,
    NoData,
    ParseError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    InvalidRange,
    AmbiguousEntity,
}

/// What the presentation layer receives for every question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub status: AnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<ParsedQuery>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub answer: Answer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: Answer,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub role: ColumnRole,
}

#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub session_id: Uuid,
    pub name: String,
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
    pub created_at: DateTime<Utc>,
}
