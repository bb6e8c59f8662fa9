use idmirror::adapters::{FrontendApiIdentity, PostgrestStore};
use idmirror::config::{AppConfig, ConfigError};
use idmirror::error::{ErrorContext, IdMirrorError, IdMirrorResult, ResultExt, SyncError};
use idmirror::profile::Identity;
use idmirror::sync::{jwt_subject, CredentialSynchronizer, SyncPhase};
use idmirror::traits::{DataStore, IdentityProvider};
use idmirror::validation::{available_alternatives, UsernameValidator, ValidationPhase};

use color_eyre::eyre::{eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch::error::RecvError;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long `check-username` waits for a verdict.
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Alternatives offered for a taken username.
const SUGGESTION_COUNT: usize = 3;

fn print_usage() {
    println!("idmirror {}", VERSION);
    println!();
    println!("Usage:");
    println!("  idmirror check-username <name>    Check whether a username is available");
    println!("  idmirror sync [subject_id] [--watch]");
    println!("                                    Authorize the store and mirror the profile row");
    println!();
    println!("Configuration is read from IDMIRROR_* environment variables.");
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one candidate through the live validator and print the verdict.
async fn handle_check_username(config: &AppConfig, name: &str) -> Result<()> {
    use color_eyre::eyre::WrapErr;

    let store: Arc<dyn DataStore> = Arc::new(PostgrestStore::new(
        config.store_url.clone(),
        config.store_api_key.clone(),
    ));
    let validator = UsernameValidator::new(Arc::clone(&store), config.validation.clone());
    let mut states = validator.subscribe();

    validator.on_input_changed(name);

    let verdict = tokio::time::timeout(CHECK_TIMEOUT, async {
        loop {
            let state = states.borrow_and_update().clone();
            if state.is_settled() {
                return Ok::<_, RecvError>(state);
            }
            states.changed().await?;
        }
    })
    .await
    .wrap_err("Timed out waiting for the availability check")?
    .map_err(|_| eyre!("Validator stopped"))?;

    match verdict.phase {
        ValidationPhase::Valid => {
            println!("✓ {} is available", verdict.input_value);
        }
        _ => {
            let message = verdict.message.unwrap_or_else(|| "Invalid username".to_string());
            println!("✗ {}: {}", verdict.input_value, message);

            let suggestions = available_alternatives(
                store.as_ref(),
                &config.validation,
                &verdict.input_value,
                SUGGESTION_COUNT,
            )
            .await;
            if !suggestions.is_empty() {
                println!("  Try: {}", suggestions.join(", "));
            }
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Sign in, authorize the store and make sure the profile row exists.
async fn handle_sync(config: &AppConfig, subject_id: Option<&str>, watch: bool) -> IdMirrorResult<()> {
    let session_id = config
        .session_id
        .clone()
        .ok_or(ConfigError::MissingVar("IDMIRROR_SESSION_ID"))?;

    let identity_provider =
        Arc::new(FrontendApiIdentity::new(config.identity_url.clone()).with_session(session_id));
    let store = Arc::new(PostgrestStore::new(
        config.store_url.clone(),
        config.store_api_key.clone(),
    ));

    let subject_id = match subject_id {
        Some(subject_id) => subject_id.to_string(),
        None => {
            let token = identity_provider
                .acquire_credential(&config.sync.template)
                .await
                .context(ErrorContext::new("resolve_subject").with_component("cli"))?;
            token
                .as_deref()
                .and_then(jwt_subject)
                .ok_or(IdMirrorError::Sync(SyncError::NotSignedIn))?
        }
    };

    let synchronizer = CredentialSynchronizer::new(identity_provider, store, config.sync.clone());

    println!("Signing in {}...", subject_id);
    let credential = synchronizer
        .sign_in(Identity::new(subject_id.clone()))
        .await
        .with_context(|| {
            ErrorContext::new("sign_in")
                .with_subject_id(subject_id.clone())
                .with_new_correlation_id()
        })?;
    match credential {
        Some(credential) => {
            println!("✓ Store authorized (template: {})", credential.template);
            if let Some(expires_at) = credential.expires_at {
                println!("  Credential expires at {}", expires_at.to_rfc3339());
            }
        }
        None => return Err(IdMirrorError::Sync(SyncError::NotSignedIn)),
    }

    if synchronizer.is_profile_synced() {
        println!("✓ Profile row present for {}", subject_id);
    } else {
        println!("⚠ Profile row not synced yet; it will be retried on refresh");
    }

    if !watch {
        synchronizer.sign_out();
        return Ok(());
    }

    println!(
        "Refreshing every {}s. Press Ctrl-C to stop.",
        synchronizer.config().refresh_interval.as_secs()
    );
    let mut phases = synchronizer.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = *phases.borrow_and_update();
                tracing::info!(?phase, "Sync phase changed");
                if phase == SyncPhase::Unauthenticated {
                    println!("✗ Session ended");
                    break;
                }
            }
        }
    }

    synchronizer.sign_out();
    Ok(())
}

/// Print a failed command's error the way a user should see it and exit.
fn exit_with(err: IdMirrorError) -> ! {
    tracing::error!(
        code = err.error_code(),
        category = %err.category(),
        context = %err.context().map(ErrorContext::to_log_string).unwrap_or_default(),
        error = %err,
        "Command failed"
    );
    eprintln!("Error: {}", err.user_message());
    eprintln!("{}", err.recovery_hint());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--version") | Some("-V") => {
            println!("idmirror {}", VERSION);
            Ok(())
        }
        Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some("check-username") => {
            let name = args
                .get(1)
                .ok_or_else(|| eyre!("check-username requires a <name> argument"))?;
            let config = AppConfig::from_env()?;
            handle_check_username(&config, name).await
        }
        Some("sync") => {
            let watch = args.iter().any(|arg| arg == "--watch");
            let subject_id = args[1..]
                .iter()
                .find(|arg| !arg.starts_with("--"))
                .map(String::as_str);
            let result = match AppConfig::from_env() {
                Ok(config) => handle_sync(&config, subject_id, watch).await,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                exit_with(err);
            }
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }
}
