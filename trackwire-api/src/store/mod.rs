//! Release record store
//!
//! CRUD for release metadata plus independent per-platform status
//! transitions. Each platform's status lives in its own column pair and is
//! written by a guarded single-column UPDATE, so no platform's progress can
//! roll back or block another's.
//!
//! Status transitions are enforced: `pending → processing → {completed,
//! failed}`, terminal states accept only idempotent re-application, and a
//! late write cannot overwrite `cancelled`. The bulk [`ReleaseStore::cancel`]
//! is the policy exception and overrides everything.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use trackwire_common::events::{EventBus, TrackwireEvent};
use trackwire_common::{CodeKind, Platform, PlatformStatus};

/// A release and its per-platform distribution state
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Distribution {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub artist: String,
    pub file_url: String,
    pub cover_art_url: Option<String>,
    pub youtube_status: PlatformStatus,
    pub youtube_url: Option<String>,
    pub spotify_status: PlatformStatus,
    pub spotify_url: Option<String>,
    pub soundcloud_status: PlatformStatus,
    pub soundcloud_url: Option<String>,
    pub isrc_code: Option<String>,
    pub upc_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Distribution {
    pub fn platform_status(&self, platform: Platform) -> PlatformStatus {
        match platform {
            Platform::Youtube => self.youtube_status,
            Platform::Spotify => self.spotify_status,
            Platform::Soundcloud => self.soundcloud_status,
        }
    }

    pub fn platform_url(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Youtube => self.youtube_url.as_deref(),
            Platform::Spotify => self.spotify_url.as_deref(),
            Platform::Soundcloud => self.soundcloud_url.as_deref(),
        }
    }
}

/// Per-platform slice of a status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PlatformState {
    pub platform: Platform,
    pub status: PlatformStatus,
    pub url: Option<String>,
}

/// Poll-friendly projection of one release's distribution state
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub distribution_id: i64,
    pub title: String,
    pub platforms: Vec<PlatformState>,
}

/// New-release fields
#[derive(Debug, Clone)]
pub struct NewDistribution {
    pub user_id: i64,
    pub title: String,
    pub artist: String,
    pub file_url: String,
    pub cover_art_url: Option<String>,
    pub isrc_code: Option<String>,
    pub upc_code: Option<String>,
}

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Distribution {0} not found")]
    NotFound(i64),

    #[error("Illegal {platform} transition {from} -> {to} for distribution {distribution_id}")]
    IllegalTransition {
        distribution_id: i64,
        platform: Platform,
        from: PlatformStatus,
        to: PlatformStatus,
    },

    #[error("Status {0} requires a published URL")]
    MissingUrl(PlatformStatus),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Release record store service
#[derive(Clone)]
pub struct ReleaseStore {
    db: SqlitePool,
    bus: EventBus,
}

impl ReleaseStore {
    pub fn new(db: SqlitePool, bus: EventBus) -> Self {
        Self { db, bus }
    }

    /// Create a release; every platform starts `pending` with no URL
    pub async fn create(&self, new: NewDistribution) -> Result<Distribution, StoreError> {
        let now = Utc::now();
        let distribution = sqlx::query_as::<_, Distribution>(
            r#"
            INSERT INTO distributions
                (user_id, title, artist, file_url, cover_art_url, isrc_code, upc_code,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.artist)
        .bind(&new.file_url)
        .bind(&new.cover_art_url)
        .bind(&new.isrc_code)
        .bind(&new.upc_code)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        info!(
            distribution_id = distribution.id,
            user_id = new.user_id,
            title = %new.title,
            "Created distribution"
        );
        Ok(distribution)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Distribution>, StoreError> {
        let distribution =
            sqlx::query_as::<_, Distribution>("SELECT * FROM distributions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        Ok(distribution)
    }

    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<Distribution>, StoreError> {
        let distributions = sqlx::query_as::<_, Distribution>(
            "SELECT * FROM distributions WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(distributions)
    }

    /// Write one platform's status and URL, enforcing the transition graph
    ///
    /// The UPDATE is guarded by the set of statuses the target is legal from;
    /// a miss is classified by re-reading the row. `completed` requires a
    /// URL; every other status nulls it.
    pub async fn update_platform_status(
        &self,
        distribution_id: i64,
        platform: Platform,
        status: PlatformStatus,
        url: Option<String>,
    ) -> Result<Distribution, StoreError> {
        if status == PlatformStatus::Completed && url.is_none() {
            return Err(StoreError::MissingUrl(status));
        }
        let url = if status == PlatformStatus::Completed { url } else { None };

        let allowed = status.allowed_from();
        if allowed.is_empty() {
            return Err(self.classify_miss(distribution_id, platform, status).await);
        }
        let guard = allowed
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        // Column names come from the closed Platform enum, not caller input
        let sql = format!(
            "UPDATE distributions
             SET {status_col} = ?, {url_col} = ?, updated_at = ?
             WHERE id = ? AND {status_col} IN ({guard})
             RETURNING *",
            status_col = platform.status_column(),
            url_col = platform.url_column(),
            guard = guard,
        );

        let updated = sqlx::query_as::<_, Distribution>(&sql)
            .bind(status)
            .bind(&url)
            .bind(Utc::now())
            .bind(distribution_id)
            .fetch_optional(&self.db)
            .await?;

        match updated {
            Some(distribution) => {
                self.bus.emit(TrackwireEvent::PlatformStatusChanged {
                    distribution_id,
                    platform,
                    status,
                    url,
                    timestamp: Utc::now(),
                });
                Ok(distribution)
            }
            None => Err(self.classify_miss(distribution_id, platform, status).await),
        }
    }

    async fn classify_miss(
        &self,
        distribution_id: i64,
        platform: Platform,
        to: PlatformStatus,
    ) -> StoreError {
        match self.find_by_id(distribution_id).await {
            Ok(Some(distribution)) => StoreError::IllegalTransition {
                distribution_id,
                platform,
                from: distribution.platform_status(platform),
                to,
            },
            Ok(None) => StoreError::NotFound(distribution_id),
            Err(e) => e,
        }
    }

    /// Force-cancel every platform, regardless of current state
    ///
    /// Policy exception to the transition graph: cancellation always
    /// succeeds and is idempotent.
    pub async fn cancel(&self, distribution_id: i64) -> Result<Distribution, StoreError> {
        let updated = sqlx::query_as::<_, Distribution>(
            r#"
            UPDATE distributions
            SET youtube_status = 'cancelled', youtube_url = NULL,
                spotify_status = 'cancelled', spotify_url = NULL,
                soundcloud_status = 'cancelled', soundcloud_url = NULL,
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(distribution_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound(distribution_id))?;

        self.bus.emit(TrackwireEvent::DistributionCancelled {
            distribution_id,
            timestamp: Utc::now(),
        });
        info!(distribution_id, "Cancelled distribution on all platforms");
        Ok(updated)
    }

    /// Record an assigned code value on the release row
    pub async fn attach_code(
        &self,
        distribution_id: i64,
        kind: CodeKind,
        value: &str,
    ) -> Result<Distribution, StoreError> {
        let column = match kind {
            CodeKind::Isrc => "isrc_code",
            CodeKind::Upc => "upc_code",
        };
        let sql = format!(
            "UPDATE distributions SET {column} = ?, updated_at = ? WHERE id = ? RETURNING *",
        );
        sqlx::query_as::<_, Distribution>(&sql)
            .bind(value)
            .bind(Utc::now())
            .bind(distribution_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound(distribution_id))
    }

    /// Current per-platform snapshot for polling clients
    pub async fn status_snapshot(
        &self,
        distribution_id: i64,
    ) -> Result<StatusSnapshot, StoreError> {
        let distribution = self
            .find_by_id(distribution_id)
            .await?
            .ok_or(StoreError::NotFound(distribution_id))?;

        let platforms = Platform::ALL
            .iter()
            .map(|&platform| PlatformState {
                platform,
                status: distribution.platform_status(platform),
                url: distribution.platform_url(platform).map(str::to_string),
            })
            .collect();

        Ok(StatusSnapshot {
            distribution_id,
            title: distribution.title,
            platforms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackwire_common::db::init_memory_database;

    async fn setup() -> (SqlitePool, ReleaseStore) {
        let pool = init_memory_database().await.expect("init db");
        sqlx::query("INSERT INTO users (email, created_at) VALUES ('a@b.c', ?)")
            .bind(Utc::now())
            .execute(&pool)
            .await
            .expect("seed user");
        let store = ReleaseStore::new(pool.clone(), EventBus::new(64));
        (pool, store)
    }

    fn new_release(user_id: i64) -> NewDistribution {
        NewDistribution {
            user_id,
            title: "Neon Tide".to_string(),
            artist: "Glass Harbor".to_string(),
            file_url: "/uploads/neon-tide.mp3".to_string(),
            cover_art_url: Some("/uploads/neon-tide.jpg".to_string()),
            isrc_code: None,
            upc_code: None,
        }
    }

    #[tokio::test]
    async fn create_starts_all_platforms_pending() {
        let (_pool, store) = setup().await;
        let distribution = store.create(new_release(1)).await.expect("create");

        for platform in Platform::ALL {
            assert_eq!(distribution.platform_status(platform), PlatformStatus::Pending);
            assert_eq!(distribution.platform_url(platform), None);
        }
    }

    #[tokio::test]
    async fn platform_updates_are_independent() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        store
            .update_platform_status(id, Platform::Youtube, PlatformStatus::Processing, None)
            .await
            .expect("youtube processing");
        let updated = store
            .update_platform_status(
                id,
                Platform::Youtube,
                PlatformStatus::Failed,
                None,
            )
            .await
            .expect("youtube failed");

        assert_eq!(updated.youtube_status, PlatformStatus::Failed);
        assert_eq!(updated.spotify_status, PlatformStatus::Pending);
        assert_eq!(updated.soundcloud_status, PlatformStatus::Pending);
    }

    #[tokio::test]
    async fn completed_requires_url_and_records_it() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        store
            .update_platform_status(id, Platform::Spotify, PlatformStatus::Processing, None)
            .await
            .expect("processing");

        assert!(matches!(
            store
                .update_platform_status(id, Platform::Spotify, PlatformStatus::Completed, None)
                .await,
            Err(StoreError::MissingUrl(PlatformStatus::Completed))
        ));

        let updated = store
            .update_platform_status(
                id,
                Platform::Spotify,
                PlatformStatus::Completed,
                Some("https://open.spotify.com/track/x".to_string()),
            )
            .await
            .expect("completed");
        assert_eq!(
            updated.spotify_url.as_deref(),
            Some("https://open.spotify.com/track/x")
        );
    }

    #[tokio::test]
    async fn completion_cannot_skip_processing() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        match store
            .update_platform_status(
                id,
                Platform::Youtube,
                PlatformStatus::Completed,
                Some("https://youtube.com/watch?v=abc".to_string()),
            )
            .await
        {
            Err(StoreError::IllegalTransition { from, to, .. }) => {
                assert_eq!(from, PlatformStatus::Pending);
                assert_eq!(to, PlatformStatus::Completed);
            }
            other => panic!("expected IllegalTransition, got {:?}", other.map(|d| d.id)),
        }
    }

    #[tokio::test]
    async fn late_completion_cannot_overwrite_cancelled() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        store
            .update_platform_status(id, Platform::Youtube, PlatformStatus::Processing, None)
            .await
            .expect("processing");
        store.cancel(id).await.expect("cancel");

        // The in-flight publish settles after the cancel; its write must lose
        let result = store
            .update_platform_status(
                id,
                Platform::Youtube,
                PlatformStatus::Completed,
                Some("https://youtube.com/watch?v=late".to_string()),
            )
            .await;
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));

        let snapshot = store.status_snapshot(id).await.expect("snapshot");
        assert!(snapshot
            .platforms
            .iter()
            .all(|p| p.status == PlatformStatus::Cancelled && p.url.is_none()));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        let first = store.cancel(id).await.expect("first cancel");
        let second = store.cancel(id).await.expect("second cancel");

        for platform in Platform::ALL {
            assert_eq!(first.platform_status(platform), PlatformStatus::Cancelled);
            assert_eq!(second.platform_status(platform), PlatformStatus::Cancelled);
        }
    }

    #[tokio::test]
    async fn terminal_reapplication_is_idempotent() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        store
            .update_platform_status(id, Platform::Soundcloud, PlatformStatus::Processing, None)
            .await
            .expect("processing");
        store
            .update_platform_status(id, Platform::Soundcloud, PlatformStatus::Failed, None)
            .await
            .expect("failed");
        // Same terminal state again is accepted
        let again = store
            .update_platform_status(id, Platform::Soundcloud, PlatformStatus::Failed, None)
            .await
            .expect("failed again");
        assert_eq!(again.soundcloud_status, PlatformStatus::Failed);

        // A different terminal state is not
        assert!(matches!(
            store
                .update_platform_status(
                    id,
                    Platform::Soundcloud,
                    PlatformStatus::Completed,
                    Some("https://soundcloud.com/x".to_string()),
                )
                .await,
            Err(StoreError::IllegalTransition { .. })
        ));
    }

    #[tokio::test]
    async fn missing_distribution_is_not_found() {
        let (_pool, store) = setup().await;
        assert!(matches!(
            store
                .update_platform_status(404, Platform::Youtube, PlatformStatus::Processing, None)
                .await,
            Err(StoreError::NotFound(404))
        ));
        assert!(matches!(store.cancel(404).await, Err(StoreError::NotFound(404))));
        assert!(matches!(
            store.status_snapshot(404).await,
            Err(StoreError::NotFound(404))
        ));
    }

    #[tokio::test]
    async fn attach_code_records_value() {
        let (_pool, store) = setup().await;
        let id = store.create(new_release(1)).await.expect("create").id;

        let updated = store
            .attach_code(id, CodeKind::Isrc, "US-ABC-24-00042")
            .await
            .expect("attach");
        assert_eq!(updated.isrc_code.as_deref(), Some("US-ABC-24-00042"));
        assert_eq!(updated.upc_code, None);
    }
}
