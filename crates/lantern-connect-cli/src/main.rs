/*
[INPUT]:  CLI arguments, persisted session state, custody service responses
[OUTPUT]: Embedded wallet connect/sign/status operations from a terminal
[POS]:    Binary entry point - headless demo of the SDK
[UPDATE]: When changing CLI flags or the demo flows
*/

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use lantern_connect::embedded::FileSessionStore;
use lantern_connect::types::{
    AddressType, AuthOptions, AuthProviderKind, ConnectOutcome, EmbeddedWalletType, ProviderType,
};
use lantern_connect::{
    DiscoveryService, EmbeddedConfig, FileStore, ProviderManager, RecordingNavigator, SdkConfig,
    UrlParams, WalletRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "lantern-connect-cli", version, about = "Lantern embedded wallet demo")]
struct Cli {
    /// Custody service base URL
    #[arg(long, value_name = "URL", default_value = "https://custody.lantern.dev")]
    custody_url: Url,
    /// Hosted auth page base URL
    #[arg(long, value_name = "URL", default_value = "https://connect.lantern.dev/auth")]
    auth_url: Url,
    /// Application identifier sent during provisioning
    #[arg(long, value_name = "ID", default_value = "lantern-cli")]
    app_id: String,
    /// Directory for session and key/value persistence
    #[arg(long, value_name = "PATH", default_value = "./.lantern-config")]
    data_dir: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision or resume an embedded wallet connection
    Connect {
        #[arg(long, value_enum, default_value_t = WalletTypeArg::App)]
        wallet_type: WalletTypeArg,
        /// Auth strategy; omitted means the wallet type's default
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
        /// Bearer token for the jwt provider
        #[arg(long, value_name = "TOKEN")]
        jwt_token: Option<String>,
        /// Callback URL pasted back after a redirect flow
        #[arg(long, value_name = "URL")]
        callback_url: Option<Url>,
    },
    /// Show the current connection and its addresses
    Status,
    /// Sign a message with the connected wallet
    Sign {
        #[arg(long, value_enum, default_value_t = AddressTypeArg::Solana)]
        address_type: AddressTypeArg,
        #[arg(value_name = "MESSAGE")]
        message: String,
    },
    /// Clear the stored session
    Disconnect,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WalletTypeArg {
    App,
    User,
}

impl From<WalletTypeArg> for EmbeddedWalletType {
    fn from(arg: WalletTypeArg) -> Self {
        match arg {
            WalletTypeArg::App => EmbeddedWalletType::AppWallet,
            WalletTypeArg::User => EmbeddedWalletType::UserWallet,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Connect,
    Google,
    Apple,
    Jwt,
    AppWallet,
}

impl From<ProviderArg> for AuthProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Connect => AuthProviderKind::Connect,
            ProviderArg::Google => AuthProviderKind::Google,
            ProviderArg::Apple => AuthProviderKind::Apple,
            ProviderArg::Jwt => AuthProviderKind::Jwt,
            ProviderArg::AppWallet => AuthProviderKind::AppWallet,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AddressTypeArg {
    Solana,
    Ethereum,
}

impl From<AddressTypeArg> for AddressType {
    fn from(arg: AddressTypeArg) -> Self {
        match arg {
            AddressTypeArg::Solana => AddressType::Solana,
            AddressTypeArg::Ethereum => AddressType::Ethereum,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    let wallet_type = match &args.command {
        Command::Connect { wallet_type, .. } => (*wallet_type).into(),
        _ => EmbeddedWalletType::AppWallet,
    };
    let callback_url = match &args.command {
        Command::Connect { callback_url, .. } => callback_url.clone(),
        _ => None,
    };

    let manager = build_manager(&args, wallet_type, callback_url)?;

    match args.command {
        Command::Connect {
            provider,
            jwt_token,
            ..
        } => {
            let outcome = manager
                .connect(&AuthOptions {
                    provider: provider.map(Into::into),
                    jwt_token,
                })
                .await
                .context("connect")?;
            match outcome {
                ConnectOutcome::Completed {
                    wallet_id,
                    addresses,
                } => {
                    println!("connected (wallet {})", wallet_id.as_deref().unwrap_or("-"));
                    print_addresses(&addresses);
                }
                ConnectOutcome::Redirecting { auth_url } => {
                    println!("complete authentication in a browser:\n\n  {auth_url}\n");
                    println!("then re-run with --callback-url \"<url you were sent back to>\"");
                }
            }
        }
        Command::Status => {
            if manager.auto_connect().await {
                let info = manager.get_current_provider_info();
                println!("connected through {:?} backend", info.provider_type);
                print_addresses(&manager.get_addresses());
            } else {
                println!("not connected");
            }
        }
        Command::Sign {
            address_type,
            message,
        } => {
            if !manager.auto_connect().await {
                bail!("not connected; run `connect` first");
            }
            let signature = manager
                .sign_message(address_type.into(), message.as_bytes())
                .await
                .context("sign message")?;
            println!("{signature}");
        }
        Command::Disconnect => {
            if manager.auto_connect().await {
                manager.disconnect().await.context("disconnect")?;
                info!("session cleared");
            }
            println!("disconnected");
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn build_manager(
    args: &Cli,
    wallet_type: EmbeddedWalletType,
    callback_url: Option<Url>,
) -> Result<ProviderManager> {
    let address_types: BTreeSet<AddressType> =
        BTreeSet::from([AddressType::Solana, AddressType::Ethereum]);

    let config = SdkConfig {
        address_types: address_types.clone(),
        default_provider: ProviderType::Embedded,
        embedded: Some(EmbeddedConfig {
            custody_base_url: args.custody_url.clone(),
            auth_base_url: args.auth_url.clone(),
            redirect_url: None,
            app_id: args.app_id.clone(),
            wallet_type,
            address_types,
        }),
    };

    // Headless host: no injected wallets to discover, file-backed persistence,
    // and a navigator that records instead of opening a browser.
    let registry = WalletRegistry::new(Arc::new(DiscoveryService::new(None, None, None)));
    let store = FileStore::new(args.data_dir.join("store"));
    let session_store = FileSessionStore::new(args.data_dir.join("session.json"));
    let url_params = callback_url.map(UrlParams::from_url).unwrap_or_default();

    ProviderManager::new(
        config,
        registry,
        Arc::new(store.clone()),
        Arc::new(session_store),
        Arc::new(store),
        Arc::new(RecordingNavigator::new()),
        url_params,
    )
    .context("initialize provider manager")
}

fn print_addresses(addresses: &[lantern_connect::WalletAddress]) {
    for address in addresses {
        let kind = match address.address_type {
            AddressType::Solana => "solana",
            AddressType::Ethereum => "ethereum",
        };
        println!("  {kind:>9}  {}", address.address);
    }
}
