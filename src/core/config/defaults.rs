use crate::core::config::data::{
    AssistantConfig, Config, LoggingConfig, ServerConfig, UpstreamConfig,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_LOG_FILTER: &str = "info";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the assistant on a personal portfolio site. \
Answer visitors' questions about the site owner's projects, experience and skills in a \
friendly, concise tone. When you need facts you do not have, call get_training_data. \
When a visitor asks to see projects, experience, contact details or booking, call \
render_box_component with the matching component instead of describing it at length.";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "CHATFOLIO_MODEL";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            functions: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Overlay `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `CHATFOLIO_MODEL`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(api_key) = non_empty(ENV_API_KEY) {
            self.upstream.api_key = Some(api_key);
        }
        if let Some(base_url) = non_empty(ENV_BASE_URL) {
            self.upstream.base_url = base_url;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.upstream.model = model;
        }
    }

    pub fn apply_process_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    pub fn override_server(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
    }
}
