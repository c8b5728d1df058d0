// Adapters layer: concrete clients for the exchanges, the completion API, the webhook and local storage.

pub mod bybit;
pub mod discord;
pub mod kraken;
pub mod openai;
pub mod storage;

pub use bybit::BybitClient;
pub use discord::DiscordNotifier;
pub use kraken::KrakenClient;
pub use openai::OpenAiClient;
pub use storage::LocalStorage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl ExchangeCredentials {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> Self {
        Self { api_key, api_secret }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.api_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}
