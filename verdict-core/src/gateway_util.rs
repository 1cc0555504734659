use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::db::postgres::PostgresConnectionInfo;
use crate::error::Error;
use crate::http::VerdictHttpClient;
use crate::judge::Judge;
use crate::providers::gemini::GeminiProvider;
use crate::providers::groq::GroqProvider;
use crate::providers::together::TogetherProvider;

pub const GROQ_MODEL_NAME: &str = "llama3-70b-8192";
pub const GEMINI_MODEL_NAME: &str = "gemini-1.5-flash";
pub const TOGETHER_MODEL_NAME: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";
pub const TOGETHER_MODEL_LABEL: &str = "mixtral-8x7b-instruct-v0.1";

/// Process-scoped collaborators, constructed once at startup and passed into
/// handlers explicitly through axum's `State` (never referenced as globals).
#[derive(Clone)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub http_client: VerdictHttpClient,
    pub groq: Arc<GroqProvider>,
    pub gemini: Arc<GeminiProvider>,
    pub together: Arc<TogetherProvider>,
    pub judge: Arc<Judge>,
    pub postgres: PostgresConnectionInfo,
}

pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    pub async fn new(config: Arc<Config>) -> Result<Self, Error> {
        let postgres = match &config.postgres_url {
            Some(url) => PostgresConnectionInfo::new(url.expose_secret()).await?,
            None => PostgresConnectionInfo::new_disabled(),
        };
        Self::new_with_postgres(config, postgres)
    }

    pub fn new_with_postgres(
        config: Arc<Config>,
        postgres: PostgresConnectionInfo,
    ) -> Result<Self, Error> {
        let http_client = VerdictHttpClient::new()?;
        let groq = Arc::new(GroqProvider::new(
            GROQ_MODEL_NAME.to_string(),
            config.groq_api_key.clone().into(),
        ));
        let gemini = Arc::new(GeminiProvider::new(
            GEMINI_MODEL_NAME.to_string(),
            config.gemini_api_key.clone().into(),
        )?);
        let together = Arc::new(TogetherProvider::new(
            TOGETHER_MODEL_NAME.to_string(),
            TOGETHER_MODEL_LABEL.to_string(),
            config.together_api_key.clone().into(),
        ));
        let judge = Arc::new(Judge::new(config.gemini_api_key.clone().into())?);

        Ok(AppStateData {
            config,
            http_client,
            groq,
            gemini,
            together,
            judge,
            postgres,
        })
    }
}
