use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocialBridgeError {
    #[error("social/profile service returned {code}: {message}")]
    Remote { code: u16, message: String },
    #[error("social/profile service did not respond before the timeout")]
    Timeout,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Out-of-process calls to the social-graph and profile services. Failures
/// from every method here except `mass_profiles` (used while assembling a
/// conflict payload) are non-fatal to the caller — see §7.
#[async_trait]
pub trait SocialBridge: Send + Sync {
    async fn import_social(
        &self,
        gamespace: &str,
        credential: &str,
        username: &str,
        auth: &serde_json::Value,
    ) -> Result<(), SocialBridgeError>;

    async fn attach_account(
        &self,
        gamespace: &str,
        credential_type: &str,
        username: &str,
        account: &str,
        env: &HashMap<String, String>,
        fetch_profile: bool,
    ) -> Result<Option<serde_json::Value>, SocialBridgeError>;

    async fn update_profile(
        &self,
        gamespace_id: &str,
        account_id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), SocialBridgeError>;

    async fn mass_profiles(
        &self,
        gamespace: &str,
        accounts: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, SocialBridgeError>;
}

/// Talks to a real social/profile service over HTTP. The three endpoints are
/// plain `POST <base_url>/<method>` calls with a JSON body, bounded by
/// `timeout`, mirroring the shape of every other internal RPC this backend
/// makes to its sibling services.
pub struct HttpSocialBridge {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSocialBridge {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value, SocialBridgeError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), method);
        let resp = self
            .client
            .post(url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SocialBridgeError::Timeout
                } else {
                    SocialBridgeError::Transport(e.into())
                }
            })?;

        if !resp.status().is_success() {
            return Err(SocialBridgeError::Remote {
                code: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| SocialBridgeError::Transport(e.into()))
    }
}

#[async_trait]
impl SocialBridge for HttpSocialBridge {
    async fn import_social(
        &self,
        gamespace: &str,
        credential: &str,
        username: &str,
        auth: &serde_json::Value,
    ) -> Result<(), SocialBridgeError> {
        self.post(
            "import_social",
            serde_json::json!({
                "gamespace": gamespace,
                "credential": credential,
                "username": username,
                "auth": auth,
            }),
        )
        .await?;
        Ok(())
    }

    async fn attach_account(
        &self,
        gamespace: &str,
        credential_type: &str,
        username: &str,
        account: &str,
        env: &HashMap<String, String>,
        fetch_profile: bool,
    ) -> Result<Option<serde_json::Value>, SocialBridgeError> {
        let result = self
            .post(
                "attach_account",
                serde_json::json!({
                    "gamespace": gamespace,
                    "credential": credential_type,
                    "username": username,
                    "account": account,
                    "env": env,
                    "fetch_profile": fetch_profile,
                }),
            )
            .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    async fn update_profile(
        &self,
        gamespace_id: &str,
        account_id: &str,
        fields: &serde_json::Value,
    ) -> Result<(), SocialBridgeError> {
        self.post(
            "update_profile",
            serde_json::json!({
                "gamespace_id": gamespace_id,
                "account_id": account_id,
                "fields": fields,
            }),
        )
        .await?;
        Ok(())
    }

    async fn mass_profiles(
        &self,
        gamespace: &str,
        accounts: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, SocialBridgeError> {
        let result = self
            .post(
                "mass_profiles",
                serde_json::json!({
                    "gamespace": gamespace,
                    "accounts": accounts,
                    "action": "get_public",
                }),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| SocialBridgeError::Transport(e.into()))
    }
}

/// Reference in-memory bridge for tests: canned profile responses, no
/// network I/O, and a log of calls made so assertions can check
/// fire-and-forget behavior.
#[derive(Default)]
pub struct MockSocialBridge {
    pub profiles: Mutex<HashMap<String, serde_json::Value>>,
    pub import_social_calls: Mutex<Vec<(String, String, String)>>,
    pub update_profile_calls: Mutex<Vec<(String, String)>>,
    pub fail_mass_profiles: std::sync::atomic::AtomicBool,
}

impl MockSocialBridge {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SocialBridge for MockSocialBridge {
    async fn import_social(
        &self,
        gamespace: &str,
        credential: &str,
        username: &str,
        _auth: &serde_json::Value,
    ) -> Result<(), SocialBridgeError> {
        self.import_social_calls.lock().unwrap().push((
            gamespace.to_string(),
            credential.to_string(),
            username.to_string(),
        ));
        Ok(())
    }

    async fn attach_account(
        &self,
        _gamespace: &str,
        _credential_type: &str,
        _username: &str,
        account: &str,
        _env: &HashMap<String, String>,
        _fetch_profile: bool,
    ) -> Result<Option<serde_json::Value>, SocialBridgeError> {
        Ok(self.profiles.lock().unwrap().get(account).cloned())
    }

    async fn update_profile(
        &self,
        gamespace_id: &str,
        account_id: &str,
        _fields: &serde_json::Value,
    ) -> Result<(), SocialBridgeError> {
        self.update_profile_calls
            .lock()
            .unwrap()
            .push((gamespace_id.to_string(), account_id.to_string()));
        Ok(())
    }

    async fn mass_profiles(
        &self,
        _gamespace: &str,
        accounts: &[String],
    ) -> Result<HashMap<String, serde_json::Value>, SocialBridgeError> {
        use std::sync::atomic::Ordering;
        if self.fail_mass_profiles.load(Ordering::SeqCst) {
            return Err(SocialBridgeError::Remote {
                code: 500,
                message: "profile service unavailable".to_string(),
            });
        }
        let profiles = self.profiles.lock().unwrap();
        Ok(accounts
            .iter()
            .map(|a| (a.clone(), profiles.get(a).cloned().unwrap_or(serde_json::json!({}))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_import_social_calls() {
        let bridge = MockSocialBridge::new();
        bridge
            .import_social("7", "google", "gg", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(bridge.import_social_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mass_profiles_fills_missing_with_empty_object() {
        let bridge = MockSocialBridge::new();
        let profiles = bridge
            .mass_profiles("7", &["2".to_string(), "3".to_string()])
            .await
            .unwrap();
        assert_eq!(profiles.get("2"), Some(&serde_json::json!({})));
    }
}
