use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use jobportal_session::api::auth::{LoginRequest, RegisterRequest};
use jobportal_session::{AuthService, ClientConfig, HttpTransport};

#[derive(Parser)]
#[command(name = "jobportal-session")]
#[command(about = "Sign in to the job portal API and make authenticated calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and store the session. Pass --company to register as an employer.
    Register {
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        company: Option<String>,
    },
    /// Show the signed-in user
    Whoami,
    /// GET a path relative to API_URL and print the response data
    Get { path: String },
    /// Sign out locally and revoke the server session
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    if config.session_file.is_none() {
        tracing::warn!("SESSION_FILE not set, the session will not outlive this process");
    }

    let auth = AuthService::from_config(&config, Arc::new(HttpTransport::new()));

    match cli.command {
        Command::Login { email, password } => {
            let user = auth.login(LoginRequest { email, password }).await?;
            println!("Signed in as {} <{}> ({:?})", user.display_name, user.email, user.role);
        }
        Command::Register {
            email,
            password,
            full_name,
            company,
        } => {
            let request = match company {
                Some(company) => RegisterRequest::employer(email, password, full_name, company),
                None => RegisterRequest::job_seeker(email, password, full_name),
            };
            let user = auth.register(request).await?;
            println!("Registered {} <{}> ({:?})", user.display_name, user.email, user.role);
        }
        Command::Whoami => match auth.current_user() {
            Some(user) => {
                println!("{} <{}> ({:?})", user.display_name, user.email, user.role);
                if let Some(expires_at) = auth.access_token_expires_at() {
                    println!("access token expires at {}", expires_at);
                }
            }
            None => println!("Not signed in"),
        },
        Command::Get { path } => {
            let data: serde_json::Value = auth.client().get(&path).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::Logout => {
            auth.logout().await;
            println!("Signed out");
        }
    }

    Ok(())
}
