use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Editorial state of an article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleStatus {
    Draft,
    PendingReview,
    Published,
    Rejected,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::PendingReview => "pending_review",
            ArticleStatus::Published => "published",
            ArticleStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ReviewError> {
        match value {
            "draft" => Ok(ArticleStatus::Draft),
            "pending_review" => Ok(ArticleStatus::PendingReview),
            "published" => Ok(ArticleStatus::Published),
            "rejected" => Ok(ArticleStatus::Rejected),
            other => Err(ReviewError::InternalError(format!(
                "Unknown article status: {}",
                other
            ))),
        }
    }

    /// Editors may publish straight from draft as well as from review.
    pub fn can_be_approved(&self) -> bool {
        matches!(
            self,
            ArticleStatus::PendingReview | ArticleStatus::Draft | ArticleStatus::Rejected
        )
    }
}

/// Database row of `articles`, reduced to what review needs
#[derive(Debug, FromRow, Clone)]
pub struct ArticleRow {
    pub id: i64,
    pub author_id: Uuid,
    pub status: String,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub author_id: Uuid,
    pub status: ArticleStatus,
    pub title: String,
    pub slug: String,
}

impl TryFrom<ArticleRow> for Article {
    type Error = ReviewError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            author_id: row.author_id,
            status: ArticleStatus::parse(&row.status)?,
            title: row.title,
            slug: row.slug,
        })
    }
}

/// Request body of an approval
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct ApproveArticleRequest {
    /// Optional note for the author
    #[schema(example = "مقال رائع")]
    #[serde(default)]
    pub review_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApproveArticleResponse {
    #[schema(example = "true")]
    pub ok: bool,
    #[schema(example = "published")]
    pub status: String,
    /// Publish notifications queued for followers
    #[schema(example = "12")]
    pub notifications_queued: usize,
}

/// Possible review errors
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Article not found")]
    NotFound,

    #[error("Only reviewers can approve articles")]
    Forbidden,

    #[error("Cannot approve an article in status {0}")]
    InvalidStatusTransition(&'static str),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Error response for the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewErrorResponse {
    #[schema(example = "invalid_status_transition")]
    pub error: String,

    #[schema(example = "INVALID_STATUS_TRANSITION")]
    pub code: String,
}
