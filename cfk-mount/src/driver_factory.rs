//! Concrete driver construction from a `StorageConfig`.
//!
//! `driver_type` selects which provider's credential shape the decrypted
//! JSON blob is parsed as; this is the one place in the gateway that
//! matches on a concrete provider, per the "dynamic dispatch is confined
//! to the driver factory" design note.

use cfk_core::mount::StorageConfig;
use cfk_core::{CfkError, CfkResult, StorageDriver};
use cfk_providers::LocalDriver;
use std::sync::Arc;

use crate::credentials::CredentialCipher;

#[derive(serde::Deserialize)]
struct LocalCredentials {
    root: String,
}

pub async fn build_driver(config: &StorageConfig, cipher: &dyn CredentialCipher) -> CfkResult<Arc<dyn StorageDriver>> {
    let plaintext = cipher.decrypt(&config.credentials);

    let driver: Arc<dyn StorageDriver> = match config.driver_type.as_str() {
        "local" => {
            let creds: LocalCredentials =
                serde_json::from_slice(&plaintext).map_err(|e| CfkError::driver("config", e.to_string()))?;
            Arc::new(LocalDriver::new(&config.id, creds.root))
        }

        #[cfg(feature = "s3")]
        "s3" => {
            let creds: cfk_providers::S3Config =
                serde_json::from_slice(&plaintext).map_err(|e| CfkError::driver("config", e.to_string()))?;
            Arc::new(cfk_providers::S3Driver::new(&config.id, creds))
        }

        #[cfg(feature = "webdav")]
        "webdav" => {
            let creds: cfk_providers::WebDavConfig =
                serde_json::from_slice(&plaintext).map_err(|e| CfkError::driver("config", e.to_string()))?;
            Arc::new(cfk_providers::WebDavDriver::new(&config.id, creds))
        }

        #[cfg(feature = "gdrive")]
        "gdrive" => {
            #[derive(serde::Deserialize)]
            struct GdriveCredentials {
                config: cfk_providers::GoogleDriveConfig,
                tokens: Option<cfk_providers::GoogleTokens>,
            }
            let creds: GdriveCredentials =
                serde_json::from_slice(&plaintext).map_err(|e| CfkError::driver("config", e.to_string()))?;
            let driver = cfk_providers::GoogleDriveDriver::new(&config.id, creds.config);
            if let Some(tokens) = creds.tokens {
                driver.set_tokens(tokens).await;
            }
            Arc::new(driver)
        }

        #[cfg(feature = "onedrive")]
        "onedrive" => {
            #[derive(serde::Deserialize)]
            struct OneDriveCredentials {
                config: cfk_providers::OneDriveConfig,
                tokens: Option<cfk_providers::OneDriveTokens>,
            }
            let creds: OneDriveCredentials =
                serde_json::from_slice(&plaintext).map_err(|e| CfkError::driver("config", e.to_string()))?;
            let driver = cfk_providers::OneDriveDriver::new(&config.id, creds.config);
            if let Some(tokens) = creds.tokens {
                driver.set_tokens(tokens).await;
            }
            Arc::new(driver)
        }

        #[cfg(feature = "github")]
        "github" => {
            let creds: cfk_providers::GithubConfig =
                serde_json::from_slice(&plaintext).map_err(|e| CfkError::driver("config", e.to_string()))?;
            Arc::new(cfk_providers::GithubDriver::new(&config.id, creds))
        }

        other => return Err(CfkError::driver("config", format!("unknown driver type: {other}"))),
    };

    Ok(driver)
}
