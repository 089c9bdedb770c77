use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cryptopilot::{
    api::{AuthApi, CryptoPaymentRequest, HttpApi},
    arguments::{patterns, print_debug_info},
    config::{self, Config},
    logger::{self, LogTag},
    payments::{PaymentsClient, PollOutcome},
    realtime::{ChannelHandlers, RealtimeManager, StreamKind},
    session::{Credentials, PasswordCredentials, SessionManager},
    storage::{FileStore, SessionStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cryptopilot")]
#[command(about = "CryptoPilot session and realtime client", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/cryptopilot/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the backend answers
    Health,
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CRYPTOPILOT_PASSWORD")]
        password: String,
        /// Authenticator code, when the account has MFA enabled
        #[arg(long)]
        mfa_code: Option<String>,
        #[arg(long)]
        remember: bool,
    },
    /// Verify the stored session and show the current user
    Whoami,
    /// End the session
    Logout {
        /// Log out from every device
        #[arg(long)]
        all: bool,
    },
    /// List the active logins of this account
    Sessions,
    /// Sign out one login, e.g. a lost device
    RevokeSession {
        session_id: String,
    },
    /// Print updates from a realtime stream
    Watch {
        /// portfolio, market, signals or prices
        stream: String,
        /// Comma separated symbols for the prices stream
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Pay for a plan in crypto and wait for confirmation
    CryptoPay {
        #[arg(long)]
        plan: String,
        /// Price in USD
        #[arg(long)]
        amount: f64,
        /// bitcoin, ethereum or usdt
        #[arg(long, default_value = "bitcoin")]
        crypto: String,
        #[arg(long, default_value = "monthly")]
        period: String,
    },
    /// Write the active configuration (defaults if none exists) to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Create a card checkout session and print its URL
    Checkout {
        #[arg(long)]
        plan: String,
        #[arg(long, default_value = "monthly")]
        period: String,
    },
}

struct App {
    config: Config,
    api: Arc<HttpApi>,
    session: SessionManager,
}

impl App {
    fn build(config_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = config_path.or_else(config::default_config_path) {
            config::load_config_from_path(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
        }
        let config = config::get_config_clone();

        if config.logging.file_enabled {
            logger::enable_file_logging();
        }

        let store_path = if config.storage.path.is_empty() {
            FileStore::default_path().context("No data directory for the session file")?
        } else {
            PathBuf::from(&config.storage.path)
        };
        let store = FileStore::open(store_path.clone())
            .with_context(|| format!("Failed to open session store {}", store_path.display()))?;

        let api = Arc::new(HttpApi::new(&config.api).context("Failed to create HTTP client")?);
        let session = SessionManager::new(
            api.clone(),
            SessionStore::new(Arc::new(store)),
            config.session.clone(),
        );

        Ok(Self {
            config,
            api,
            session,
        })
    }

    async fn require_login(&self) -> Result<()> {
        self.session.initialize().await;
        if !self.session.is_authenticated() {
            bail!("Not logged in. Run `cryptopilot login` first.");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_console();
    let cli = Cli::parse_from(patterns::without_logging_flags());
    print_debug_info();

    if let Command::InitConfig { force } = cli.command {
        return init_config(cli.config, force);
    }

    let app = App::build(cli.config)?;
    let result = run(&app, cli.command).await;

    app.session.shutdown();
    logger::flush();
    result
}

fn init_config(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = config_path
        .or_else(config::default_config_path)
        .context("No config directory; pass --config")?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    config::load_config_from_path(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config::save_config(&path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Health => {
            app.api
                .health()
                .await
                .with_context(|| format!("Backend at {} is unreachable", app.api.base_url()))?;
            println!("Backend at {} is healthy", app.api.base_url());
        }

        Command::Login {
            email,
            password,
            mfa_code,
            remember,
        } => {
            let credentials = Credentials::Password(PasswordCredentials {
                email,
                password,
                mfa_code,
                remember_me: remember,
            });
            let result = app.session.login(&credentials).await;
            if result.success {
                let name = app
                    .session
                    .current_user()
                    .map(|u| u.display_name())
                    .unwrap_or_default();
                println!("Logged in as {}", name);
            } else if result.requires_mfa {
                bail!("This account requires an MFA code, pass --mfa-code");
            } else if result.rate_limited {
                bail!("Too many attempts, try again later");
            } else if result.account_locked {
                bail!("Account is temporarily locked");
            } else {
                bail!(
                    "Login failed: {}",
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }

        Command::Whoami => {
            app.session.initialize().await;
            let snapshot = app.session.snapshot();
            match snapshot.user {
                Some(user) => {
                    println!("User:     {}", user.display_name());
                    println!("Id:       {}", user.id);
                    println!("Tier:     {}", user.subscription_tier);
                    if let Some(limit) = user.usage.daily_limit {
                        println!("API use:  {}/{} today", user.usage.api_calls_count, limit);
                    }
                    if !snapshot.online {
                        println!("(offline, showing cached data)");
                    }
                }
                None => println!("Not logged in"),
            }
        }

        Command::Logout { all } => {
            app.session.logout(all).await;
            println!(
                "{}",
                if all {
                    "Logged out from all devices"
                } else {
                    "Logged out"
                }
            );
        }

        Command::Sessions => {
            app.require_login().await?;
            let sessions = app
                .session
                .sessions()
                .await
                .context("Failed to list sessions")?;
            if sessions.is_empty() {
                println!("No active sessions");
            }
            for session in sessions {
                println!(
                    "{}  last active {}  {} ({})",
                    session.session_id,
                    session.last_activity,
                    session.ip_address.as_deref().unwrap_or("unknown"),
                    session.user_agent.as_deref().unwrap_or("unknown"),
                );
            }
        }

        Command::RevokeSession { session_id } => {
            app.require_login().await?;
            app.session
                .revoke_session(&session_id)
                .await
                .with_context(|| format!("Failed to revoke session {}", session_id))?;
            println!("Revoked {}", session_id);
        }

        Command::Watch {
            stream,
            symbols,
            duration,
        } => {
            app.require_login().await?;
            let symbols: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
            let kind = StreamKind::from_name(&stream, symbols)
                .with_context(|| format!("Unknown stream '{}'", stream))?;
            watch(app, kind, duration).await?;
        }

        Command::CryptoPay {
            plan,
            amount,
            crypto,
            period,
        } => {
            app.require_login().await?;
            let payments = PaymentsClient::new(app.api.clone(), app.config.payments.clone());
            let request = CryptoPaymentRequest {
                plan_id: plan.clone(),
                amount,
                currency: "USD".to_string(),
                billing_period: period,
                crypto_type: crypto,
            };
            let payment = payments.create_crypto_payment(&app.session, &request).await?;
            println!(
                "Send {} {} to {}",
                payment.amount_crypto, payment.crypto_symbol, payment.wallet_address
            );
            println!("Invoice {} expires at {}", payment.payment_id, payment.expires_at);

            match payments
                .wait_for_crypto_payment(&app.session, &payment.payment_id, &plan)
                .await?
            {
                PollOutcome::Completed { subscription_id } => println!(
                    "Payment confirmed, subscription {}",
                    subscription_id.unwrap_or_else(|| "active".to_string())
                ),
                PollOutcome::Expired => bail!("Invoice {} expired", payment.payment_id),
                PollOutcome::TimedOut { polls } => {
                    bail!("No confirmation after {} checks", polls)
                }
            }
        }

        Command::Checkout { plan, period } => {
            app.require_login().await?;
            let payments = PaymentsClient::new(app.api.clone(), app.config.payments.clone());
            let checkout = payments.checkout(&app.session, &plan, &period).await?;
            println!("{}", checkout.url);
        }

        Command::InitConfig { .. } => bail!("init-config runs before the session is opened"),
    }
    Ok(())
}

async fn watch(app: &App, kind: StreamKind, duration: Option<u64>) -> Result<()> {
    let realtime = RealtimeManager::with_tungstenite(
        &app.config.api,
        app.config.realtime.clone(),
        app.session.token_source(),
    );
    let handlers = ChannelHandlers::new()
        .on_connect(|| logger::info(LogTag::Realtime, "Stream open"))
        .on_disconnect(|reason| {
            logger::info(LogTag::Realtime, &format!("Stream closed: {}", reason))
        })
        .on_message(|envelope| {
            let data = serde_json::to_string(&envelope.data).unwrap_or_default();
            println!("[{}] {}", envelope.kind, data);
        });

    let channel = realtime.channel(&kind, handlers);
    channel.connect().await?;
    let mut status = channel.subscribe();

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.exhausted {
                    channel.disconnect();
                    bail!(
                        "{} stream gave up: {}",
                        kind.name(),
                        current.error.unwrap_or_default()
                    );
                }
            }
        }
    }

    channel.disconnect();
    Ok(())
}
