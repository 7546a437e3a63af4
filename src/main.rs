//! Operator binary for the subscription reconciler.
//!
//! ## Usage
//! ```bash
//! subscription-reconciler migrate
//! subscription-reconciler config-check
//! subscription-reconciler status <account-id>
//! subscription-reconciler simulate-webhook <customer-ref> <event> [--amount N] [--price ID] [--status S] [--subscription ID]
//! subscription-reconciler purge-events
//! ```
//!
//! `<event>` is one of `created`, `updated`, `deleted`, `paid`, `failed` or a
//! full Stripe event type. Configuration comes from `SUBSCRIPTIONS__*`
//! environment variables.

use std::env;
use std::error::Error;
use std::sync::Arc;

use chrono::Utc;

use subscription_reconciler::adapters::postgres::{connect, run_migrations};
use subscription_reconciler::adapters::stripe::{SimulatedEvent, SimulatedEventKind};
use subscription_reconciler::adapters::PostgresAccountStore;
use subscription_reconciler::application::{
    GetAccountStatusHandler, GetAccountStatusQuery, WebhookReconciler,
};
use subscription_reconciler::config::AppConfig;
use subscription_reconciler::domain::account::AccountSnapshot;
use subscription_reconciler::domain::foundation::{AccountId, CustomerRef, SubscriptionRef};
use subscription_reconciler::ports::AccountStore;
use subscription_reconciler::telemetry::init_tracing;

const USAGE: &str = "usage: subscription-reconciler <migrate|config-check|status|simulate-webhook|purge-events> [args]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.server);

    for warning in config.payment.configuration_errors() {
        tracing::warn!("{}", warning);
    }

    if command == "config-check" {
        println!("Configuration is valid");
        return Ok(());
    }

    let pool = connect(&config.database).await?;
    if config.database.run_migrations || command == "migrate" {
        run_migrations(&pool).await?;
    }
    let store: Arc<dyn AccountStore> = Arc::new(
        PostgresAccountStore::new(pool).with_lock_timeout(config.database.lock_timeout()),
    );

    match command.as_str() {
        "migrate" => println!("Migrations applied"),
        "status" => {
            let account_id: AccountId = required(&args, 1, "account-id")?.parse()?;
            let snapshot = GetAccountStatusHandler::new(store)
                .handle(GetAccountStatusQuery { account_id })
                .await?;
            print_snapshot(&snapshot)?;
        }
        "simulate-webhook" => {
            let customer_ref = CustomerRef::new(required(&args, 1, "customer-ref")?)?;
            let kind: SimulatedEventKind = required(&args, 2, "event")?.parse()?;
            let event = simulated_event(kind, customer_ref.clone(), &args[3..])?;

            let reconciler = WebhookReconciler::new(store.clone(), config.payment.catalog());
            let event_id = event.event_id();
            let outcome = reconciler
                .dispatch_parts(&event_id, kind.event_type(), &event.object())
                .await?;
            println!("{} {} -> {:?}", event_id, kind.event_type(), outcome);

            if let Some(account) = store.find_by_customer_ref(&customer_ref).await? {
                print_snapshot(&AccountSnapshot::from(&account))?;
            }
        }
        "purge-events" => {
            let cutoff = Utc::now() - config.webhooks.ledger_retention();
            let purged = store.purge_processed_events(cutoff).await?;
            println!("Purged {} processed events older than {}", purged, cutoff);
        }
        other => {
            eprintln!("unknown command '{}'\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("missing <{}>\n{}", name, USAGE))
}

fn simulated_event(
    kind: SimulatedEventKind,
    customer_ref: CustomerRef,
    flags: &[String],
) -> Result<SimulatedEvent, Box<dyn Error>> {
    let mut event = SimulatedEvent::new(kind, customer_ref);
    let mut flags = flags.iter();
    while let Some(flag) = flags.next() {
        let value = flags
            .next()
            .ok_or_else(|| format!("flag {} needs a value", flag))?;
        event = match flag.as_str() {
            "--amount" => event.with_amount(value.parse()?),
            "--price" => event.with_price(value.clone()),
            "--status" => event.with_status(value.clone()),
            "--subscription" => event.with_subscription(SubscriptionRef::new(value.clone())?),
            "--event-id" => event.with_event_id(value.clone()),
            other => return Err(format!("unknown flag {}", other).into()),
        };
    }
    Ok(event)
}

fn print_snapshot(snapshot: &AccountSnapshot) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}
