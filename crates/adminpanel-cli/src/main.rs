//! adminpanel - terminal sign-in for the admin dashboard.
//!
//! Collects credentials, reports field and sign-in errors, and shows who is
//! currently signed in. The session is shared with other front ends through
//! the configured session store.

use std::io::{self, Write};
use std::process::ExitCode;

use adminpanel_core::auth::FieldErrors;
use adminpanel_core::{
    AuthError, Authenticator, Config, Credentials, Locale, SessionContext, SubmitError,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable pre-filling the email prompt
const ENV_EMAIL: &str = "ADMINPANEL_EMAIL";

/// Environment variable supplying the password without prompting
const ENV_PASSWORD: &str = "ADMINPANEL_PASSWORD";

#[derive(Parser)]
#[command(name = "adminpanel", version, about = "Sign in to the admin dashboard")]
struct Cli {
    /// Language for labels (en, fa)
    #[arg(long, global = true)]
    locale: Option<Locale>,

    /// Identity provider base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and persist the session
    SignIn {
        #[arg(long)]
        email: Option<String>,
    },
    /// Clear the stored session
    SignOut,
    /// Check the stored session and show the signed-in user
    Whoami,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    config.apply_env();
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    let locale = cli.locale.unwrap_or(config.locale);

    let context = config.session_context()?;
    context.initialize();

    match cli.command {
        Command::SignIn { email } => sign_in(&mut config, context, email, locale).await,
        Command::SignOut => {
            Authenticator::new(context).sign_out();
            println!("Signed out.");
            Ok(ExitCode::SUCCESS)
        }
        Command::Whoami => whoami(&context, locale).await,
    }
}

async fn sign_in(
    config: &mut Config,
    context: SessionContext,
    email: Option<String>,
    locale: Locale,
) -> Result<ExitCode> {
    let email = match email.or_else(|| std::env::var(ENV_EMAIL).ok()) {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    let auth = Authenticator::new(context);
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("Signing in...");
    let candidate = Credentials::new(email.clone(), password);
    match auth.submit_with_cancel(candidate, &cancel).await {
        Ok(session) => {
            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            info!("Login successful");
            println!(
                "Welcome, {} ({})",
                session.user.display_name,
                session.user.role_label().text(locale)
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(SubmitError::Invalid(errors)) => {
            print_field_errors(&errors);
            Ok(ExitCode::FAILURE)
        }
        Err(SubmitError::Auth(e)) => {
            eprintln!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn whoami(context: &SessionContext, locale: Locale) -> Result<ExitCode> {
    match context.check_user_session().await {
        Ok(()) => {}
        Err(AuthError::NotAuthenticated) => {
            println!("Not signed in.");
            return Ok(ExitCode::FAILURE);
        }
        Err(e @ (AuthError::SessionExpired | AuthError::SessionRejected)) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            // Provider unreachable: report it and fall back to the local session
            eprintln!("Warning: {}", e);
        }
    }

    let Some(session) = context.current_session() else {
        println!("Not signed in.");
        return Ok(ExitCode::FAILURE);
    };
    println!("{}", session.user.display_name);
    println!("  id:      {}", session.user.id);
    println!("  role:    {}", context.role_label(locale));
    if session.needs_refresh() {
        println!("  expires: in {}m (sign in again soon)", session.minutes_until_expiry());
    } else {
        println!("  expires: in {}m", session.minutes_until_expiry());
    }
    Ok(ExitCode::SUCCESS)
}

fn prompt_email(last_email: Option<&str>) -> Result<String> {
    match last_email {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match last_email {
        Some(last) if input.is_empty() => last.to_string(),
        _ => input.to_string(),
    })
}

fn print_field_errors(errors: &FieldErrors) {
    for error in errors.iter() {
        eprintln!("  {}: {}", error.field.name(), error.message);
    }
}
