use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_role")]
    pub default_role: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaintingConfig {
    /// Canonical file the base64 painting path re-encodes into.
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub transport: TransportConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub painting: PaintingConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_role: default_role(),
        }
    }
}

impl Default for PaintingConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_role() -> String {
    "human".to_string()
}

fn default_output_path() -> String {
    "image.png".to_string()
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CHATNET").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Secrets may be written as ${OPENAI_API_KEY}
        app_config.transport.api_key = expand_env(&app_config.transport.api_key);
        app_config.transport.api_base = expand_env(&app_config.transport.api_base);
        if let Some(ref mut proxy) = app_config.transport.proxy {
            *proxy = expand_env(proxy);
        }

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        val.to_string()
    }
}
