use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use plants_core::config::{Config, MessagingConfig, Secrets};
use plants_core::jobs::JobDb;
use plants_core::paths;
use plants_core::store::SqliteStore;

use crate::messaging::{LogMessenger, Messenger, TwilioMessenger};

/// Shared application state passed to all route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub store: Arc<Mutex<SqliteStore>>,
    pub jobs: Arc<JobDb>,
    pub messenger: Arc<dyn Messenger>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Load config and open both databases under `root`.
    pub fn open(root: PathBuf, secrets: Secrets) -> anyhow::Result<Self> {
        let config = Config::load(&root)?;
        for w in config.validate().iter().chain(config.validate_secrets(&secrets).iter()) {
            tracing::warn!(level = ?w.level, "{}", w.message);
        }
        let store = SqliteStore::open(&paths::db_path(&root))?;
        let jobs = JobDb::open(&paths::jobs_path(&root))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        let messenger: Arc<dyn Messenger> = match &config.messaging {
            MessagingConfig::Log => Arc::new(LogMessenger),
            MessagingConfig::Twilio {
                account_sid,
                whatsapp_from,
                api_base,
                messages_api_base,
            } => {
                let token = secrets.twilio_auth_token.clone().ok_or_else(|| {
                    anyhow::anyhow!("PLANTS_TWILIO_AUTH_TOKEN is required for the twilio provider")
                })?;
                Arc::new(TwilioMessenger::new(
                    http.clone(),
                    account_sid.clone(),
                    token,
                    whatsapp_from.clone(),
                    api_base.clone(),
                    messages_api_base.clone(),
                ))
            }
        };
        Ok(Self::new(root, config, secrets, store, jobs, messenger, http))
    }

    pub fn new(
        root: PathBuf,
        config: Config,
        secrets: Secrets,
        store: SqliteStore,
        jobs: JobDb,
        messenger: Arc<dyn Messenger>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            root,
            config: Arc::new(config),
            secrets: Arc::new(secrets),
            store: Arc::new(Mutex::new(store)),
            jobs: Arc::new(jobs),
            messenger,
            http,
        }
    }

    /// Run `f` against the store on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut SqliteStore) -> plants_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| anyhow::anyhow!("store mutex poisoned"))?;
            f(&mut guard).map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| anyhow::anyhow!("task join error: {e}"))??;
        Ok(result)
    }

    /// Run `f` against the job queue on the blocking pool.
    pub async fn with_jobs<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&JobDb) -> plants_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.jobs.clone();
        let result = tokio::task::spawn_blocking(move || f(&jobs))
            .await
            .map_err(|e| anyhow::anyhow!("task join error: {e}"))??;
        Ok(result)
    }

    /// Plant limit for a user right now; `None` means unlimited.
    pub async fn plan_limit(&self, user_id: &str) -> anyhow::Result<Option<u32>> {
        let user_id = user_id.to_string();
        let free_limit = self.config.plans.free_plant_limit;
        let now = chrono::Utc::now();
        let tier = self
            .with_store(move |s| s.effective_tier(&user_id, now))
            .await?;
        Ok(match tier {
            plants_core::types::PlanTier::Free => Some(free_limit),
            plants_core::types::PlanTier::Pro => None,
        })
    }
}
