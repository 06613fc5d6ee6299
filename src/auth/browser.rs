//! Authorization-code-with-PKCE browser login flow.
//!
//! Binds a single-use loopback listener on an ephemeral port, sends the
//! user's browser to the provider's `/authorize` endpoint, captures exactly
//! one callback, and exchanges the authorization code. The listener's
//! lifetime is owned by an RAII guard: whichever step fails, dropping the
//! guard aborts the serve task and frees the port.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::endpoints::{IdentityClient, TokenResponse};
use crate::auth::error::{AuthError, Error, Result};
use crate::auth::pkce::{PkceExchange, CHALLENGE_METHOD};

/// How long the user gets to finish signing in.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Dynamic/private port range probed for the redirect listener.
const PORT_RANGE: std::ops::RangeInclusive<u16> = 49152..=65535;

/// Bind attempts before giving up on finding a free port.
const MAX_PORT_ATTEMPTS: usize = 20;

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>Signed in</title></head>\
<body style=\"font-family:sans-serif;margin:4em\"><h2>Sign-in complete</h2>\
<p>You can close this tab and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>Sign-in failed</title></head>\
<body style=\"font-family:sans-serif;margin:4em\"><h2>Sign-in failed</h2>\
<p>The callback was invalid. Return to the terminal and try again.</p></body></html>";

/// What the flow did with the authorization URL.
#[derive(Debug)]
pub struct BrowserPrompt<'a> {
    /// The `/authorize` URL for this attempt.
    pub url: &'a str,
    /// Whether a browser was launched; when false the user must open the
    /// URL by hand.
    pub opened: bool,
}

/// PKCE browser flow engine.
#[derive(Debug)]
pub struct BrowserLoginFlow<'a> {
    identity: &'a IdentityClient,
    timeout: Duration,
    launch_browser: bool,
}

impl<'a> BrowserLoginFlow<'a> {
    pub fn new(identity: &'a IdentityClient) -> Self {
        Self {
            identity,
            timeout: CALLBACK_TIMEOUT,
            launch_browser: true,
        }
    }

    /// Override the callback wait window.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skip launching a browser (headless environments and tests); the
    /// authorization URL is still handed to `on_prompt`.
    #[must_use]
    pub fn with_browser_launch(mut self, launch: bool) -> Self {
        self.launch_browser = launch;
        self
    }

    /// Run the flow to completion.
    ///
    /// `on_prompt` fires once the listener is up and the browser launch was
    /// attempted, so the caller can tell the user what is happening.
    pub async fn run(
        &self,
        tenant: &str,
        scope: &str,
        login_hint: Option<&str>,
        on_prompt: impl FnOnce(&BrowserPrompt<'_>),
    ) -> Result<TokenResponse> {
        let (listener, port) = bind_ephemeral_port().await?;
        let redirect_uri = format!("http://localhost:{port}");

        let pkce = PkceExchange::generate();
        let auth_url = self.build_authorize_url(tenant, &redirect_uri, scope, &pkce, login_hint);

        // Listener before browser: the callback target must exist before
        // anything can redirect to it. The guard aborts the serve task on
        // every exit path from here on.
        let mut server = CallbackServer::spawn(listener, pkce.state.clone());
        tracing::info!(port, "awaiting login callback");

        let opened = if self.launch_browser {
            open::that(&auth_url).is_ok()
        } else {
            false
        };
        on_prompt(&BrowserPrompt {
            url: &auth_url,
            opened,
        });

        let code = match tokio::time::timeout(self.timeout, server.wait()).await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(AuthError::CallbackTimeout.into()),
        };

        self.identity
            .exchange_code(tenant, &code, &pkce.verifier, &redirect_uri, scope)
            .await
    }

    fn build_authorize_url(
        &self,
        tenant: &str,
        redirect_uri: &str,
        scope: &str,
        pkce: &PkceExchange,
        login_hint: Option<&str>,
    ) -> String {
        // prompt=select_account keeps a cached browser session from silently
        // picking the wrong account.
        let mut url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method={}&state={}&prompt=select_account",
            self.identity.authorize_endpoint(tenant),
            urlencoding::encode(&self.identity.config().client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(scope),
            urlencoding::encode(&pkce.challenge),
            CHALLENGE_METHOD,
            urlencoding::encode(&pkce.state),
        );
        if let Some(hint) = login_hint {
            url.push_str("&login_hint=");
            url.push_str(&urlencoding::encode(hint));
        }
        url
    }
}

/// Probe random ports in the dynamic range until one binds.
async fn bind_ephemeral_port() -> Result<(TcpListener, u16)> {
    use rand::Rng;
    for _ in 0..MAX_PORT_ATTEMPTS {
        // ThreadRng is not Send; keep it out of scope across the await.
        let port = rand::thread_rng().gen_range(PORT_RANGE);
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => tracing::trace!(port, error = %e, "port busy, probing another"),
        }
    }
    Err(AuthError::PortExhausted.into())
}

/// RAII handle over the one-shot callback listener task.
struct CallbackServer {
    handle: JoinHandle<Result<String>>,
}

impl CallbackServer {
    fn spawn(listener: TcpListener, expected_state: String) -> Self {
        Self {
            handle: tokio::spawn(serve_once(listener, expected_state)),
        }
    }

    /// Wait for the single callback and return the authorization code.
    async fn wait(&mut self) -> Result<String> {
        (&mut self.handle)
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("callback task: {e}"))))?
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve exactly one HTTP GET on the listener, then shut down — valid
/// callback or not, so a single bad request can never wedge the flow.
async fn serve_once(listener: TcpListener, expected_state: String) -> Result<String> {
    let (mut stream, peer) = listener.accept().await?;
    tracing::debug!(%peer, "callback connection accepted");

    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let outcome = classify_callback(&request, &expected_state);

    let (status, page) = match outcome {
        Ok(_) => ("200 OK", SUCCESS_PAGE),
        Err(_) => ("400 Bad Request", FAILURE_PAGE),
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
        page.len()
    );
    stream.write_all(response.as_bytes()).await?;
    let _ = stream.shutdown().await;

    outcome
}

/// Pull the authorization code out of the raw callback request, enforcing
/// the anti-forgery state.
fn classify_callback(request: &str, expected_state: &str) -> Result<String> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or(AuthError::MissingCode)?;

    let url = url::Url::parse(&format!("http://localhost{target}"))
        .map_err(|_| AuthError::MissingCode)?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => error_description = value.into_owned(),
            _ => {}
        }
    }

    // The provider reported a failure instead of issuing a code.
    if let Some(code) = error {
        return Err(Error::provider(code, error_description));
    }

    match (code, state) {
        (Some(code), Some(state)) if state == expected_state => Ok(code),
        (Some(_), Some(_)) => Err(AuthError::StateMismatch.into()),
        _ => Err(AuthError::MissingCode.into()),
    }
}
