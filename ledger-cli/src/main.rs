//! # Ledger CLI
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store (handles connection and migration)
//! - Build the account cache, the event bus and its subscribers
//! - Create the ledger service and run one command against it

mod config;

use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_core::{AuditLogHandler, BalanceUpdateHandler, EventBus, LedgerService};
use ledger_repo::{AccountCache, CachedAccountRepository, InMemoryCache, build_store};
use ledger_types::{
    AccountContext, AccountId, AccountRepository, AccountType, CacheInvalidator,
    CreateAccountRequest, CreateTransactionRequest, Currency, TransactionId,
    TransactionRepository, TransactionType, UnitOfWorkFactory, UpdateTransactionRequest, UserId,
};

use crate::config::{Config, LogFormat};

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author, version, about = "Personal and business finance ledger", long_about = None)]
struct Cli {
    /// Database URL; overrides DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account operations
    Account {
        #[command(subcommand)]
        action: AccountCommands,
    },
    /// Transaction operations
    Tx {
        #[command(subcommand)]
        action: TransactionCommands,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Open a new account
    Open {
        /// Owner (UUID)
        #[arg(long)]
        user: UserId,
        /// Account name
        #[arg(long)]
        name: String,
        /// BANK, WALLET, INVESTMENT or CREDIT_CARD
        #[arg(long = "type", default_value = "BANK")]
        account_type: AccountType,
        /// PERSONAL or BUSINESS
        #[arg(long, default_value = "PERSONAL")]
        context: AccountContext,
        /// Currency (BRL, USD, EUR, GBP)
        #[arg(long, default_value = "BRL")]
        currency: Currency,
        /// Opening balance in minor units
        #[arg(long, default_value_t = 0)]
        opening_balance: i64,
    },
    /// Get account details
    Show {
        /// Account ID (UUID)
        id: AccountId,
    },
    /// List a user's accounts
    List {
        #[arg(long)]
        user: UserId,
        /// Only accounts in this context
        #[arg(long)]
        context: Option<AccountContext>,
    },
    /// Count a user's accounts
    Count {
        #[arg(long)]
        user: UserId,
    },
    /// Rename an account
    Rename { id: AccountId, name: String },
    /// Reactivate an account
    Activate { id: AccountId },
    /// Deactivate an account, freezing its balance
    Deactivate { id: AccountId },
    /// Permanently delete an account without transactions
    Remove { id: AccountId },
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// Record an income or expense
    Record {
        #[arg(long)]
        account: AccountId,
        /// INCOME or EXPENSE
        #[arg(long = "type")]
        transaction_type: TransactionType,
        /// Amount in minor units
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "BRL")]
        currency: Currency,
        #[arg(long, default_value = "")]
        description: String,
        /// Date the entry happened (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replace a transaction's type, amount, description and date
    Revise {
        id: TransactionId,
        #[arg(long = "type")]
        transaction_type: TransactionType,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "BRL")]
        currency: Currency,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete a transaction and reverse its effect
    Delete { id: TransactionId },
    /// Get transaction details
    Show { id: TransactionId },
    /// List an account's transactions, most recent first
    List {
        #[arg(long)]
        account: AccountId,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ledger_core=debug,ledger_repo=debug".into());

    // Logs go to stderr; stdout carries command output.
    let (json, text) = match format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Text => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env(cli.database_url)?;
    init_tracing(config.log_format);

    tracing::debug!(
        cache_ttl_secs = config.cache_ttl.as_secs(),
        cache_alert_threshold = config.cache_alert_threshold,
        "Configuration loaded"
    );

    // Build store (handles connection and migration)
    let store = build_store(&config.database_url).await?;

    let cache = AccountCache::new(Arc::new(InMemoryCache::new()), config.cache_ttl)
        .with_alert_threshold(config.cache_alert_threshold);

    let bus = Arc::new(EventBus::new());
    BalanceUpdateHandler::new(store.accounts(), cache.clone()).register(&bus);
    AuditLogHandler.register(&bus);

    let service = LedgerService::new(
        store.clone(),
        CachedAccountRepository::new(store.accounts(), cache.clone()),
        store.transactions(),
        cache,
        bus,
    );

    match cli.command {
        Commands::Account { action } => run_account(&service, action).await,
        Commands::Tx { action } => run_transaction(&service, action).await,
    }
}

async fn run_account<U, A, T, I>(
    service: &LedgerService<U, A, T, I>,
    action: AccountCommands,
) -> Result<()>
where
    U: UnitOfWorkFactory,
    A: AccountRepository,
    T: TransactionRepository,
    I: CacheInvalidator,
{
    match action {
        AccountCommands::Open {
            user,
            name,
            account_type,
            context,
            currency,
            opening_balance,
        } => {
            let account = service
                .open_account(CreateAccountRequest {
                    user_id: user,
                    name,
                    account_type,
                    context,
                    currency,
                    opening_balance,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        AccountCommands::Show { id } => {
            let account = service.get_account(id).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        AccountCommands::List { user, context } => {
            let accounts = match context {
                Some(context) => service.list_accounts_in_context(user, context).await?,
                None => service.list_accounts(user).await?,
            };
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
        AccountCommands::Count { user } => {
            println!("{}", service.count_accounts(user).await?);
        }
        AccountCommands::Rename { id, name } => {
            let account = service.rename_account(id, name).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        AccountCommands::Activate { id } => {
            let account = service.activate_account(id).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        AccountCommands::Deactivate { id } => {
            let account = service.deactivate_account(id).await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        AccountCommands::Remove { id } => {
            service.remove_account(id).await?;
            println!("✓ Account removed");
        }
    }
    Ok(())
}

async fn run_transaction<U, A, T, I>(
    service: &LedgerService<U, A, T, I>,
    action: TransactionCommands,
) -> Result<()>
where
    U: UnitOfWorkFactory,
    A: AccountRepository,
    T: TransactionRepository,
    I: CacheInvalidator,
{
    match action {
        TransactionCommands::Record {
            account,
            transaction_type,
            amount,
            currency,
            description,
            date,
        } => {
            let tx = service
                .record_transaction(CreateTransactionRequest {
                    account_id: account,
                    transaction_type,
                    amount,
                    currency,
                    description,
                    occurred_on: date.unwrap_or_else(today),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
        }
        TransactionCommands::Revise {
            id,
            transaction_type,
            amount,
            currency,
            description,
            date,
        } => {
            let tx = service
                .revise_transaction(
                    id,
                    UpdateTransactionRequest {
                        transaction_type,
                        amount,
                        currency,
                        description,
                        occurred_on: date.unwrap_or_else(today),
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
        }
        TransactionCommands::Delete { id } => {
            service.delete_transaction(id).await?;
            println!("✓ Transaction deleted");
        }
        TransactionCommands::Show { id } => {
            let tx = service.get_transaction(id).await?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
        }
        TransactionCommands::List { account } => {
            let transactions = service.list_transactions(account).await?;
            println!("{}", serde_json::to_string_pretty(&transactions)?);
        }
    }
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
