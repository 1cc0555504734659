use crate::error::{Error, ErrorDetails};

/// A thin wrapper around `reqwest::Client` shared by the provider adapters
/// and the judge, so the connection pool is process-scoped.
#[derive(Clone, Debug)]
pub struct VerdictHttpClient {
    client: reqwest::Client,
}

impl VerdictHttpClient {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            Error::new(ErrorDetails::AppState {
                message: format!("Failed to build HTTP client: {e}"),
            })
        })?;
        Ok(VerdictHttpClient { client })
    }

    pub fn post<U: reqwest::IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.client.post(url)
    }
}
