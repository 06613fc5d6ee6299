//! Command implementations.

use anyhow::Context;
use console::style;

use crate::auth::{
    device, resource_scope, AuthError, BrowserLoginFlow, DeviceCodeFlow, Error, IdentityClient,
    ProfileStore, TokenBroker, TokenResponse,
};
use crate::config::AppConfig;

fn broker_for(config: &AppConfig, profile: &str) -> anyhow::Result<TokenBroker> {
    let oauth = config.oauth_config(profile);
    if oauth.client_id.is_empty() {
        return Err(Error::config(format!(
            "no client id configured for profile {profile}; set one in config.toml"
        ))
        .into());
    }
    let identity = IdentityClient::new(oauth);
    let store = ProfileStore::open_default()?;
    Ok(TokenBroker::new(identity, store))
}

fn resolve_profile<'a>(config: &'a AppConfig, profile: Option<&'a str>) -> &'a str {
    profile.unwrap_or(&config.default_profile)
}

/// `ppctl login`
pub async fn login(
    config: &AppConfig,
    profile: Option<&str>,
    tenant: Option<&str>,
    device_code: bool,
    hint: Option<&str>,
) -> anyhow::Result<()> {
    let profile = resolve_profile(config, profile);
    let tenant = tenant
        .map(str::to_string)
        .unwrap_or_else(|| config.tenant_for(profile));
    let broker = broker_for(config, profile)?;
    let scope = resource_scope(&config.resource);

    let tokens = if device_code {
        run_device_flow(broker.identity(), &tenant, &scope).await?
    } else {
        match run_browser_flow(broker.identity(), &tenant, &scope, hint).await {
            Ok(tokens) => tokens,
            Err(Error::Auth(AuthError::PortExhausted)) => {
                // Required fallback, not an optimization: no usable listener
                // means the browser flow cannot work at all.
                eprintln!(
                    "{}",
                    style("No free local port for the browser callback; switching to device code sign-in.")
                        .yellow()
                );
                run_device_flow(broker.identity(), &tenant, &scope).await?
            }
            Err(err) => {
                Err(err).context("browser sign-in failed — retry with --device-code")?
            }
        }
    };

    let record = broker.finish_login(profile, &tenant, &config.resource, &tokens)?;
    println!(
        "{} Signed in as {} (tenant {})",
        style("ok").green().bold(),
        style(&record.user).bold(),
        record.tenant_id
    );
    Ok(())
}

async fn run_browser_flow(
    identity: &IdentityClient,
    tenant: &str,
    scope: &str,
    hint: Option<&str>,
) -> crate::auth::Result<TokenResponse> {
    BrowserLoginFlow::new(identity)
        .run(tenant, scope, hint, |prompt| {
            if prompt.opened {
                println!("Complete the sign-in in your browser; waiting for the callback...");
            } else {
                println!("Open this URL in a browser to sign in:\n\n  {}\n", prompt.url);
            }
        })
        .await
}

async fn run_device_flow(
    identity: &IdentityClient,
    tenant: &str,
    scope: &str,
) -> anyhow::Result<TokenResponse> {
    DeviceCodeFlow::new(identity)
        .run(tenant, scope, |session| {
            println!("{}", style(device::synthesize_instructions(session)).bold());
        })
        .await
        .context("device code sign-in failed — run `ppctl login` to retry")
}

/// `ppctl logout`
pub fn logout(config: &AppConfig, profile: Option<&str>) -> anyhow::Result<()> {
    let profile = resolve_profile(config, profile);
    let broker = broker_for(config, profile)?;
    broker.logout(profile)?;
    println!("{} Signed out of profile {}", style("ok").green().bold(), profile);
    Ok(())
}

/// `ppctl status`
pub fn status(config: &AppConfig, profile: Option<&str>) -> anyhow::Result<()> {
    let profile = resolve_profile(config, profile);
    let broker = broker_for(config, profile)?;
    let status = broker.status(profile);

    if status.logged_in {
        println!("Profile:   {}", style(profile).bold());
        println!("Status:    {}", style("logged in").green());
        println!("User:      {}", status.user.unwrap_or_default());
        println!("Tenant:    {}", status.tenant.unwrap_or_default());
        if let Some(at) = status.acquired_at {
            println!("Acquired:  {}", at.to_rfc3339());
        }
    } else {
        println!("Profile:   {}", style(profile).bold());
        println!(
            "Status:    {} (run `ppctl login` to sign in)",
            style("not logged in").red()
        );
    }
    Ok(())
}

/// `ppctl token`
pub async fn token(
    config: &AppConfig,
    resource: Option<&str>,
    profile: Option<&str>,
) -> anyhow::Result<()> {
    let profile = resolve_profile(config, profile);
    let resource = resource.unwrap_or(&config.resource);
    let broker = broker_for(config, profile)?;

    match broker.get_access_token(resource, profile).await {
        Ok(token) => {
            // Stdout only, so the output can be piped into curl and friends.
            println!("{token}");
            Ok(())
        }
        // NotAuthenticated already tells the user to log in; anything else
        // gets the same instruction rather than a bare transport error.
        Err(err @ Error::Auth(AuthError::NotAuthenticated)) => Err(err.into()),
        Err(err) => Err(err).context("token acquisition failed — run `ppctl login` again"),
    }
}
