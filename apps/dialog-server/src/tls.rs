use anyhow::{Context, Result};
use dialog_core::AppConfig;
use std::fs;
use tracing::warn;

/// PEM material loaded once at bootstrap and shared by both transport
/// surfaces.
pub struct TlsMaterial {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub ca: Option<Vec<u8>>,
}

/// Load whatever TLS material the config points at.
///
/// With cert, key and CA all configured, unreadable files are a fatal
/// startup error. A partial configuration degrades to plaintext with a
/// warning (development mode).
pub fn load_tls_material(config: &AppConfig) -> Result<Option<TlsMaterial>> {
    if !config.server_tls_configured() {
        warn!("TLS paths are empty, running without transport security");
        return Ok(None);
    }

    match read_material(config) {
        Ok(material) => Ok(Some(material)),
        Err(err) if config.tls_fully_configured() => Err(err),
        Err(err) => {
            warn!(error = %err, "TLS material could not be loaded, falling back to plaintext");
            Ok(None)
        }
    }
}

fn read_material(config: &AppConfig) -> Result<TlsMaterial> {
    let cert = fs::read(&config.cert_path)
        .with_context(|| format!("Failed to read server certificate {}", config.cert_path))?;
    let key = fs::read(&config.key_path)
        .with_context(|| format!("Failed to read server key {}", config.key_path))?;
    let ca = if config.ca_path.is_empty() {
        None
    } else {
        Some(
            fs::read(&config.ca_path)
                .with_context(|| format!("Failed to read CA bundle {}", config.ca_path))?,
        )
    };

    Ok(TlsMaterial { cert, key, ca })
}
