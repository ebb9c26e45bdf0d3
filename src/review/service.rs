use crate::notification::contacts::ContactResolver;
use crate::notification::delivery::{EmailChannel, OutgoingEmail};
use crate::notification::processor::NotificationProcessor;
use crate::notification::producer::EventProducer;
use crate::notification::render::ContentRenderer;
use crate::notification::store::ContactDirectory;
use crate::review::model::{
    ApproveArticleResponse, Article, ArticleRow, ArticleStatus, ReviewError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn find_article(&self, id: i64) -> Result<Option<Article>, ReviewError>;

    async fn mark_published(
        &self,
        id: i64,
        reviewer_id: Uuid,
        review_notes: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<(), ReviewError>;
}

#[derive(Debug, Clone)]
pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn find_article(&self, id: i64) -> Result<Option<Article>, ReviewError> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, author_id, status, title, slug
            FROM articles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Article::try_from).transpose()
    }

    async fn mark_published(
        &self,
        id: i64,
        reviewer_id: Uuid,
        review_notes: Option<String>,
        reviewed_at: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        sqlx::query(
            r#"
            UPDATE articles
            SET status = 'published',
                reviewed_at = $2,
                reviewed_by = $3,
                review_notes = $4,
                review_submitted_at = COALESCE(review_submitted_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reviewed_at)
        .bind(reviewer_id)
        .bind(review_notes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to publish article {}: {}", id, e);
            ReviewError::DatabaseError(e)
        })?;

        Ok(())
    }
}

/// Sends the "your article is live" email straight to the author.
///
/// Not queued: the author hears about the approval even when they opted out
/// of notification emails.
pub struct AuthorMailer {
    directory: Arc<dyn ContactDirectory>,
    renderer: ContentRenderer,
    channel: Arc<dyn EmailChannel>,
}

impl AuthorMailer {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        renderer: ContentRenderer,
        channel: Arc<dyn EmailChannel>,
    ) -> Self {
        Self {
            directory,
            renderer,
            channel,
        }
    }

    /// Best effort; every failure is logged and swallowed.
    pub async fn send_approval(&self, article: &Article, review_notes: Option<&str>) {
        let contact = match ContactResolver::new(self.directory.as_ref())
            .resolve_contact(article.author_id)
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                error!("Error looking up author of article {}: {}", article.id, e);
                return;
            }
        };

        let Some(to) = contact.email else {
            warn!(
                "Author {} has no email on file, skipping approval email",
                article.author_id
            );
            return;
        };

        let message = self.renderer.render_approval(
            contact.display_name.as_deref(),
            &article.title,
            &article.slug,
            review_notes,
        );
        let outcome = self
            .channel
            .send(&OutgoingEmail {
                to,
                subject: message.subject,
                text: message.text,
                html: message.html,
            })
            .await;

        if outcome.success {
            info!("Approval email sent for article {}", article.id);
        } else {
            error!(
                "Failed to send approval email for article {}: {}",
                article.id,
                outcome.error.unwrap_or_default()
            );
        }
    }
}

/// Editorial approval: publishes an article, tells its author and notifies
/// the author's followers.
pub struct ReviewService {
    articles: Arc<dyn ArticleStore>,
    producer: EventProducer,
    processor: Arc<NotificationProcessor>,
    mailer: AuthorMailer,
    reviewer_emails: Vec<String>,
}

impl ReviewService {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        producer: EventProducer,
        processor: Arc<NotificationProcessor>,
        mailer: AuthorMailer,
        reviewer_emails: Vec<String>,
    ) -> Self {
        Self {
            articles,
            producer,
            processor,
            mailer,
            reviewer_emails: reviewer_emails
                .into_iter()
                .map(|email| email.to_lowercase())
                .collect(),
        }
    }

    pub fn is_reviewer(&self, email: Option<&str>) -> bool {
        email.map_or(false, |email| {
            let email = email.to_lowercase();
            self.reviewer_emails.iter().any(|reviewer| *reviewer == email)
        })
    }

    /// Approve an article for publication.
    ///
    /// Once the article is published, queueing follower notifications, the
    /// author email and the processor run are best effort: their failures are
    /// logged and the approval still succeeds.
    pub async fn approve(
        &self,
        reviewer_id: Uuid,
        reviewer_email: Option<&str>,
        article_id: i64,
        review_notes: Option<String>,
    ) -> Result<ApproveArticleResponse, ReviewError> {
        if !self.is_reviewer(reviewer_email) {
            warn!("User {} tried to approve article {}", reviewer_id, article_id);
            return Err(ReviewError::Forbidden);
        }

        let article = self
            .articles
            .find_article(article_id)
            .await?
            .ok_or(ReviewError::NotFound)?;

        if !article.status.can_be_approved() {
            return Err(ReviewError::InvalidStatusTransition(article.status.as_str()));
        }

        let review_notes = review_notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());

        self.articles
            .mark_published(article.id, reviewer_id, review_notes.clone(), Utc::now())
            .await?;
        info!("Article {} approved by {}", article.id, reviewer_id);

        let queued = match self
            .producer
            .fan_out_publish(article.author_id, article.id, &article.title, &article.slug)
            .await
        {
            Ok(ids) => ids.len(),
            Err(e) => {
                error!(
                    "Error enqueueing publish notifications for article {}: {}",
                    article.id, e
                );
                0
            }
        };

        self.mailer
            .send_approval(&article, review_notes.as_deref())
            .await;

        match self.processor.process_pending_events().await {
            Ok(summary) => info!(
                "Post-approval notification run: {} sent, {} skipped, {} failed",
                summary.processed,
                summary.skipped,
                summary.failed.len()
            ),
            Err(e) => error!(
                "Error running notification processor after approving article {}: {}",
                article.id, e
            ),
        }

        Ok(ApproveArticleResponse {
            ok: true,
            status: ArticleStatus::Published.as_str().to_string(),
            notifications_queued: queued,
        })
    }
}
