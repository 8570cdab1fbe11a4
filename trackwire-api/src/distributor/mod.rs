//! Platform distributor
//!
//! Fans one release out to every supported platform concurrently. Each
//! platform attempt is independent: it moves its own status column to
//! `processing`, publishes, and records `completed` (with URL) or `failed`.
//! The fan-out joins all attempts as settled values, so one platform's
//! failure is a recorded outcome, never an exception that disturbs the rest.
//!
//! One attempt per platform per distribution request; there is no retry
//! layer here. Callers poll [`Distributor::check_distribution_status`] for
//! progress.

mod clients;

pub use clients::{
    PlatformClient, PlatformError, SoundcloudClient, SpotifyClient, YoutubeClient,
};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use trackwire_common::{Platform, PlatformStatus};

use crate::store::{ReleaseStore, StatusSnapshot, StoreError};

/// Metadata handed to every platform publish call
#[derive(Debug, Clone, Default)]
pub struct ReleaseMetadata {
    pub title: String,
    pub artist: String,
    pub description: String,
    pub tags: Vec<String>,
    pub youtube_token: Option<String>,
    pub spotify_token: Option<String>,
    pub soundcloud_token: Option<String>,
}

impl ReleaseMetadata {
    pub fn token(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Youtube => self.youtube_token.as_deref(),
            Platform::Spotify => self.spotify_token.as_deref(),
            Platform::Soundcloud => self.soundcloud_token.as_deref(),
        }
    }
}

/// Metrics for one platform; numbers mean whatever the platform reports
#[derive(Debug, Clone, Serialize)]
pub struct PlatformAnalytics {
    pub platform: Platform,
    pub plays: u64,
    pub likes: u64,
    pub comments: u64,
}

/// How one platform's attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Publish succeeded; URL recorded
    Published { url: String },
    /// Publish failed; platform marked `failed`
    Failed { cause: String },
    /// Attempt never started (release cancelled or gone before processing)
    Skipped { reason: String },
}

/// Settled result for one platform
#[derive(Debug, Clone)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub outcome: Outcome,
}

/// Fan-out orchestrator over the configured platform clients
#[derive(Clone)]
pub struct Distributor {
    store: ReleaseStore,
    clients: Vec<Arc<dyn PlatformClient>>,
}

impl Distributor {
    pub fn new(store: ReleaseStore, clients: Vec<Arc<dyn PlatformClient>>) -> Self {
        Self { store, clients }
    }

    /// Push one release to every platform concurrently
    ///
    /// Returns after all attempts have settled. No ordering is guaranteed
    /// between platforms; the outcome list is in completion order.
    pub async fn distribute_to_all(
        &self,
        distribution_id: i64,
        file_url: &str,
        metadata: &ReleaseMetadata,
    ) -> Vec<PlatformOutcome> {
        let mut tasks = FuturesUnordered::new();
        for client in &self.clients {
            let client = Arc::clone(client);
            let store = self.store.clone();
            let file_url = file_url.to_string();
            let metadata = metadata.clone();
            tasks.push(async move {
                distribute_one(store, client, distribution_id, &file_url, &metadata).await
            });
        }

        let mut outcomes = Vec::with_capacity(self.clients.len());
        while let Some(outcome) = tasks.next().await {
            outcomes.push(outcome);
        }

        info!(
            distribution_id,
            published = outcomes.iter().filter(|o| matches!(o.outcome, Outcome::Published { .. })).count(),
            failed = outcomes.iter().filter(|o| matches!(o.outcome, Outcome::Failed { .. })).count(),
            "Distribution fan-out settled"
        );
        outcomes
    }

    /// Current per-platform snapshot; safe to poll repeatedly
    pub async fn check_distribution_status(
        &self,
        distribution_id: i64,
    ) -> Result<StatusSnapshot, StoreError> {
        self.store.status_snapshot(distribution_id).await
    }

    /// Best-effort analytics for one platform
    ///
    /// Fail-soft by contract: provider errors (and unpublished platforms)
    /// are reported as an absent result, never an error.
    pub async fn get_analytics(
        &self,
        distribution_id: i64,
        platform: Platform,
    ) -> Option<PlatformAnalytics> {
        let distribution = match self.store.find_by_id(distribution_id).await {
            Ok(Some(d)) => d,
            Ok(None) => return None,
            Err(e) => {
                warn!(distribution_id, %e, "Analytics lookup failed reading release");
                return None;
            }
        };

        let url = distribution.platform_url(platform)?.to_string();
        let client = self.clients.iter().find(|c| c.platform() == platform)?;

        match client.analytics(&url).await {
            Ok(analytics) => Some(analytics),
            Err(e) => {
                warn!(distribution_id, platform = %platform, %e, "Analytics provider error");
                None
            }
        }
    }
}

/// One platform's full attempt: processing → publish → terminal status
async fn distribute_one(
    store: ReleaseStore,
    client: Arc<dyn PlatformClient>,
    distribution_id: i64,
    file_url: &str,
    metadata: &ReleaseMetadata,
) -> PlatformOutcome {
    let platform = client.platform();

    match store
        .update_platform_status(distribution_id, platform, PlatformStatus::Processing, None)
        .await
    {
        Ok(_) => {}
        Err(StoreError::IllegalTransition { from, .. }) => {
            info!(distribution_id, platform = %platform, %from, "Skipping platform, not in pending state");
            return PlatformOutcome {
                platform,
                outcome: Outcome::Skipped {
                    reason: format!("platform in state {}", from),
                },
            };
        }
        Err(e) => {
            error!(distribution_id, platform = %platform, %e, "Could not mark platform processing");
            return PlatformOutcome {
                platform,
                outcome: Outcome::Skipped { reason: e.to_string() },
            };
        }
    }

    match client.publish(file_url, metadata).await {
        Ok(url) => {
            match store
                .update_platform_status(
                    distribution_id,
                    platform,
                    PlatformStatus::Completed,
                    Some(url.clone()),
                )
                .await
            {
                Ok(_) => info!(distribution_id, platform = %platform, url = %url, "Published"),
                // The release was cancelled while the publish was in flight;
                // the cancelled status wins.
                Err(StoreError::IllegalTransition { from, .. }) => {
                    info!(
                        distribution_id,
                        platform = %platform,
                        %from,
                        "Publish settled after cancel, keeping recorded status"
                    );
                }
                Err(e) => {
                    error!(distribution_id, platform = %platform, %e, "Failed recording completion");
                }
            }
            PlatformOutcome {
                platform,
                outcome: Outcome::Published { url },
            }
        }
        Err(cause) => {
            warn!(distribution_id, platform = %platform, %cause, "Platform publish failed");
            if let Err(e) = store
                .update_platform_status(distribution_id, platform, PlatformStatus::Failed, None)
                .await
            {
                error!(distribution_id, platform = %platform, %e, "Failed recording failure status");
            }
            PlatformOutcome {
                platform,
                outcome: Outcome::Failed {
                    cause: cause.to_string(),
                },
            }
        }
    }
}
