//! PontoFácil backend CLI: serve the gateway or administer the
//! registrar directly.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use pontofacil::auth::code::scan_payload;
use pontofacil::auth::registrar::Registrar;
use pontofacil::auth::session::SessionIssuer;
use pontofacil::auth::Role;
use pontofacil::config::Config;
use pontofacil::gateway::{self, AppState};

#[derive(Parser)]
#[command(name = "pontofacil", version, about = "Device pairing and authentication backend")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve,
    /// Register a user.
    UserAdd {
        email: String,
        nome: String,
        /// Read from PONTOFACIL_PASSWORD if not given.
        #[arg(long)]
        password: Option<String>,
        /// Grant the admin role instead of employee.
        #[arg(long)]
        admin: bool,
    },
    /// Deactivate an employee (blocks logins, revokes the device).
    UserDeactivate { employee_id: String },
    /// Set an employee's login-path policy.
    PolicySet {
        employee_id: String,
        #[arg(long)]
        allow_password: bool,
        #[arg(long)]
        allow_face: bool,
    },
    /// Issue a pairing code for an employee.
    PairingIssue { employee_id: String },
    /// Show an employee's device pairing status.
    DeviceStatus { employee_id: String },
    /// Revoke an employee's active device.
    DeviceRevoke { employee_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pontofacil=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let db_path = config.database_path()?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let registrar = Arc::new(Registrar::open(&db_path, Some(config.code_ttl_secs))?);

    match cli.command {
        Command::Serve => {
            let sessions = Arc::new(SessionIssuer::new(
                config.signing_secret()?,
                Some(config.session_ttl_secs),
            ));
            let state = AppState {
                registrar,
                sessions,
            };
            gateway::serve(state, config.bind_addr()?).await?;
        }
        Command::UserAdd {
            email,
            nome,
            password,
            admin,
        } => {
            let password = match password {
                Some(p) => p,
                None => std::env::var("PONTOFACIL_PASSWORD")
                    .map_err(|_| anyhow::anyhow!("pass --password or set PONTOFACIL_PASSWORD"))?,
            };
            let role = if admin { Role::Admin } else { Role::Employee };
            let id = registrar.add_user(&email, &nome, &password, role)?;
            println!("{id}");
        }
        Command::UserDeactivate { employee_id } => {
            registrar.deactivate_employee(&employee_id)?;
            println!("deactivated");
        }
        Command::PolicySet {
            employee_id,
            allow_password,
            allow_face,
        } => {
            registrar.set_auth_policy(
                &employee_id,
                pontofacil::auth::registrar::AuthPolicy {
                    allow_password_login: allow_password,
                    allow_face_login: allow_face,
                },
            )?;
            println!("ok");
        }
        Command::PairingIssue { employee_id } => {
            let issued = registrar.issue_pairing_code(&employee_id)?;
            println!("code: {}", issued.code);
            println!("scan: {}", scan_payload(&issued.code));
            println!("expires_at: {}", issued.expires_at);
        }
        Command::DeviceStatus { employee_id } => match registrar.device_status(&employee_id)? {
            Some(device) => {
                println!("paired: true");
                println!("device_id: {}", device.device_id);
                if let Some(name) = device.device_name {
                    println!("device_name: {name}");
                }
                println!("created_at: {}", device.created_at);
            }
            None => println!("paired: false"),
        },
        Command::DeviceRevoke { employee_id } => {
            let revoked = registrar.revoke_device(&employee_id)?;
            println!("revoked: {revoked}");
        }
    }

    Ok(())
}
