use secrecy::SecretString;

/// An environment-sourced provider credential.
///
/// A missing credential is not a startup error: the orchestrator routes
/// requests to the mock path whenever any provider credential is absent.
#[derive(Clone, Debug)]
pub enum Credential {
    Static(SecretString),
    Missing,
}

impl Credential {
    fn from_env(var_name: &str) -> Self {
        match std::env::var(var_name) {
            Ok(value) if !value.is_empty() => Credential::Static(SecretString::from(value)),
            _ => Credential::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Credential::Missing)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub groq_api_key: Credential,
    pub gemini_api_key: Credential,
    pub together_api_key: Credential,
    pub postgres_url: Option<SecretString>,
}

impl Config {
    /// Reads provider credentials and the Postgres URL from the environment.
    ///
    /// Logs which values are present, never their contents.
    pub fn from_env() -> Self {
        let groq_api_key = Credential::from_env("GROQ_API_KEY");
        let gemini_api_key = Credential::from_env("GEMINI_API_KEY");
        let together_api_key = Credential::from_env("TOGETHER_API_KEY");
        let postgres_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .map(SecretString::from);

        for (name, credential) in [
            ("GROQ_API_KEY", &groq_api_key),
            ("GEMINI_API_KEY", &gemini_api_key),
            ("TOGETHER_API_KEY", &together_api_key),
        ] {
            if credential.is_missing() {
                tracing::warn!("{name} is not set");
            } else {
                tracing::info!("{name} is set");
            }
        }
        if postgres_url.is_none() {
            tracing::warn!("DATABASE_URL is not set; persistence is disabled");
        }

        Config {
            groq_api_key,
            gemini_api_key,
            together_api_key,
            postgres_url,
        }
    }

    /// The mock-path gate: a single missing key disables all three providers.
    pub fn any_provider_credential_missing(&self) -> bool {
        self.groq_api_key.is_missing()
            || self.gemini_api_key.is_missing()
            || self.together_api_key.is_missing()
    }
}
