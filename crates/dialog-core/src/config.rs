use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "dialog_service_grpc_port")]
    pub grpc_port: u16,
    #[serde(rename = "dialog_service_http_port")]
    pub http_port: u16,

    // Empty paths mean "serve/connect without TLS" (development mode)
    #[serde(rename = "dialog_service_cert_path")]
    pub cert_path: String,
    #[serde(rename = "dialog_service_key_path")]
    pub key_path: String,
    #[serde(rename = "grpc_tls_ca_path")]
    pub ca_path: String,

    pub log_level: String,
    pub env: String,

    // External services
    #[serde(rename = "llm_gateway_service_target")]
    pub llm_gateway_target: String,
    pub redis_url: String,

    // Feature flags
    pub mock_llm: bool,
}

impl AppConfig {
    /// Load configuration from the process environment, falling back to
    /// the documented defaults for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("dialog_service_grpc_port", 12061)?
            .set_default("dialog_service_http_port", 12060)?
            .set_default("dialog_service_cert_path", "")?
            .set_default("dialog_service_key_path", "")?
            .set_default("grpc_tls_ca_path", "")?
            .set_default("log_level", "info")?
            .set_default("env", "development")?
            .set_default("llm_gateway_service_target", "llm-gateway-service:16021")?
            .set_default("redis_url", "redis:6379")?
            .set_default("mock_llm", false)?
            .add_source(Environment::default().try_parsing(true));

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// True when server cert and key are both configured.
    pub fn server_tls_configured(&self) -> bool {
        !self.cert_path.is_empty() && !self.key_path.is_empty()
    }

    /// True when cert, key and CA bundle are all configured (full mTLS).
    pub fn tls_fully_configured(&self) -> bool {
        self.server_tls_configured() && !self.ca_path.is_empty()
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}
