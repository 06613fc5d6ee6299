//! Device Authorization Grant flow engine (RFC 8628).
//!
//! `Requesting` → `AwaitingUser` → {`Approved`, `Denied`, `Expired`,
//! `Error`}. The provider owns the pacing: every poll sleeps the current
//! interval first, and a `slow_down` response permanently widens that
//! interval — ignoring it is a protocol violation that gets clients
//! rate-limited.

use std::time::Duration;

use crate::auth::endpoints::{
    DeviceCodeResponse, IdentityClient, TokenResponse, ERROR_ACCESS_DENIED,
    ERROR_AUTHORIZATION_PENDING, ERROR_EXPIRED_TOKEN, ERROR_SLOW_DOWN,
};
use crate::auth::error::{AuthError, Error, Result};

/// Widening applied to the poll interval on each `slow_down`.
const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// Hard cap on poll attempts, in case the provider never reaches a terminal
/// state. With 5-second intervals this is an hour of polling.
const MAX_POLL_ATTEMPTS: u32 = 720;

/// How one poll of the token endpoint was classified.
#[derive(Debug)]
enum PollOutcome {
    /// User hasn't approved yet; poll again.
    Pending,
    /// Provider asked us to back off; widen the interval, then poll again.
    SlowDown,
    /// Terminal: tokens issued.
    Approved(Box<TokenResponse>),
    /// Terminal: denied, expired, or another provider error.
    Fatal(Error),
}

/// Device code flow engine.
#[derive(Debug)]
pub struct DeviceCodeFlow<'a> {
    identity: &'a IdentityClient,
}

impl<'a> DeviceCodeFlow<'a> {
    pub fn new(identity: &'a IdentityClient) -> Self {
        Self { identity }
    }

    /// Run the flow to a terminal state.
    ///
    /// `on_prompt` is invoked once, after initiation, with the user code and
    /// verification URI so the caller can display instructions.
    pub async fn run(
        &self,
        tenant: &str,
        scope: &str,
        on_prompt: impl FnOnce(&DeviceCodeResponse),
    ) -> Result<TokenResponse> {
        // Requesting
        let session = self.identity.request_device_code(tenant, scope).await?;
        tracing::info!(
            user_code = %session.user_code,
            verification_uri = %session.verification_uri,
            interval = session.interval,
            expires_in = session.expires_in,
            "device code session started"
        );

        // AwaitingUser
        on_prompt(&session);

        let started = std::time::Instant::now();
        let mut interval = session.interval;
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(interval)).await;

            if started.elapsed().as_secs() >= session.expires_in {
                return Err(AuthError::DeviceCodeExpired.into());
            }

            match self.poll_once(tenant, &session.device_code).await {
                PollOutcome::Pending => {
                    tracing::trace!(attempt, interval, "authorization pending");
                }
                PollOutcome::SlowDown => {
                    interval += SLOW_DOWN_INCREMENT_SECS;
                    tracing::debug!(attempt, interval, "provider requested slow_down");
                }
                PollOutcome::Approved(tokens) => {
                    tracing::info!(attempt, "device authorization approved");
                    return Ok(*tokens);
                }
                PollOutcome::Fatal(err) => return Err(err),
            }
        }

        Err(AuthError::PollLimitExceeded.into())
    }

    async fn poll_once(&self, tenant: &str, device_code: &str) -> PollOutcome {
        match self.identity.redeem_device_code(tenant, device_code).await {
            Ok(tokens) => PollOutcome::Approved(Box::new(tokens)),
            Err(Error::Provider { code, description }) => match code.as_str() {
                ERROR_AUTHORIZATION_PENDING => PollOutcome::Pending,
                ERROR_SLOW_DOWN => PollOutcome::SlowDown,
                ERROR_ACCESS_DENIED => PollOutcome::Fatal(AuthError::AccessDenied.into()),
                ERROR_EXPIRED_TOKEN => PollOutcome::Fatal(AuthError::DeviceCodeExpired.into()),
                _ => PollOutcome::Fatal(Error::Provider { code, description }),
            },
            // Transport errors are terminal here; the broker never retries a
            // user-interactive flow behind the user's back.
            Err(err) => PollOutcome::Fatal(err),
        }
    }
}

/// Instruction line shown when the provider didn't supply `message`.
pub fn synthesize_instructions(session: &DeviceCodeResponse) -> String {
    session.message.clone().unwrap_or_else(|| {
        format!(
            "To sign in, open {} in a browser and enter the code {}.",
            session.verification_uri, session.user_code
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(message: Option<&str>) -> DeviceCodeResponse {
        serde_json::from_value(serde_json::json!({
            "device_code": "DC1",
            "user_code": "ABC-123",
            "verification_uri": "https://aka.ms/devicelogin",
            "interval": 5,
            "expires_in": 900,
            "message": message,
        }))
        .unwrap()
    }

    #[test]
    fn test_synthesized_instructions() {
        let text = synthesize_instructions(&session(None));
        assert!(text.contains("ABC-123"));
        assert!(text.contains("https://aka.ms/devicelogin"));
    }

    #[test]
    fn test_provider_message_preferred() {
        let text = synthesize_instructions(&session(Some("Go to X and enter Y")));
        assert_eq!(text, "Go to X and enter Y");
    }
}
