use std::sync::Arc;

use sqlx::PgPool;

use crate::artifacts::ArtifactRepository;
use crate::config::Config;
use crate::extraction::ExtractionClient;
use crate::lms::LmsClient;
use crate::notify::Notifier;
use crate::rate_limit::IpRateLimiter;
use crate::storage::ArtifactStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub encryption_key: [u8; 32],
    pub storage: Arc<dyn ArtifactStorage>,
    pub lms: Arc<dyn LmsClient>,
    pub extraction: Arc<dyn ExtractionClient>,
    pub notifier: Arc<dyn Notifier>,
    pub artifacts: Arc<ArtifactRepository>,
    pub ip_rate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        db: PgPool,
        config: Config,
        encryption_key: [u8; 32],
        storage: Arc<dyn ArtifactStorage>,
        lms: Arc<dyn LmsClient>,
        extraction: Arc<dyn ExtractionClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let artifacts = Arc::new(ArtifactRepository::new(db.clone()));
        Self {
            db,
            config: Arc::new(config),
            encryption_key,
            storage,
            lms,
            extraction,
            notifier,
            artifacts,
            ip_rate_limiter: Arc::new(IpRateLimiter::new(60, 60)),
        }
    }
}
