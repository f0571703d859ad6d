use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use pleatpay::application::Dependencies;
use pleatpay::application::checkout::{CheckoutRequest, PaymentOrchestrator};
use pleatpay::application::refund::RefundOrchestrator;
use pleatpay::config::PaymentConfig;
use pleatpay::domain::catalog::{Cart, Coupon};
use pleatpay::domain::ports::{AuditStoreRef, CartStore, CouponStore, OrderStoreRef, ProductStore};
use pleatpay::infrastructure::in_memory::{
    InMemoryAuditStore, InMemoryCartStore, InMemoryCouponStore, InMemoryOrderStore,
    InMemoryProductStore,
};
use pleatpay::infrastructure::notifications::{QueuedNotifier, spawn_log_delivery};
use pleatpay::infrastructure::sandbox_gateway::SandboxGateway;
use pleatpay::infrastructure::session_store::SessionStore;
use pleatpay::interfaces::api::CheckoutApi;
use pleatpay::interfaces::csv::product_reader::ProductReader;
use pleatpay::logging::init_tracing;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to persistent database (optional). If provided, orders and audits use RocksDB.
    #[arg(long, global = true, env = "PLEATPAY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Default log level for this crate; RUST_LOG overrides it.
    #[arg(long, global = true, env = "PLEATPAY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true, env = "PLEATPAY_JSON_LOGS")]
    json_logs: bool,

    #[arg(long, global = true, env = "PLEATPAY_CURRENCY")]
    currency: Option<String>,

    #[arg(long, global = true, env = "PLEATPAY_PRICE_TOLERANCE")]
    price_tolerance: Option<Decimal>,

    #[arg(long, global = true, env = "PLEATPAY_MINIMUM_CHARGE")]
    minimum_charge: Option<Decimal>,

    #[arg(long, global = true, env = "PLEATPAY_SUCCESS_REDIRECT")]
    success_redirect: Option<String>,

    #[arg(long, global = true, env = "PLEATPAY_FAILURE_REDIRECT")]
    failure_redirect: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a checkout scenario against the sandbox gateway.
    Checkout {
        /// Product catalog CSV (id, name, unit_price, stock)
        catalog: PathBuf,
        /// Scenario JSON: the checkout request plus optional cart and coupons
        scenario: PathBuf,
        /// Fail the 3DS challenge instead of passing it.
        #[arg(long)]
        decline_challenge: bool,
        /// Refund this amount once the order is created.
        #[arg(long)]
        refund: Option<Decimal>,
    },
    /// Refunds a completed payment by order number, payment id or transaction id.
    Refund { identifier: String, amount: Decimal },
}

#[derive(Deserialize)]
struct Scenario {
    request: CheckoutRequest,
    #[serde(default)]
    cart: Option<Cart>,
    #[serde(default)]
    coupons: Vec<Coupon>,
}

#[derive(Serialize)]
struct Step<'a, T: Serialize> {
    step: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

fn print_step<T: Serialize>(step: &str, body: &T) -> Result<()> {
    let line = serde_json::to_string(&Step { step, body }).into_diagnostic()?;
    println!("{}", line);
    Ok(())
}

impl Cli {
    fn config(&self) -> PaymentConfig {
        let mut config = PaymentConfig::default();
        if let Some(currency) = &self.currency {
            config.currency = currency.clone();
        }
        if let Some(tolerance) = self.price_tolerance {
            config.price_tolerance = tolerance;
        }
        if let Some(minimum) = self.minimum_charge {
            config.minimum_charge = minimum;
        }
        if let Some(url) = &self.success_redirect {
            config.success_redirect = url.clone();
        }
        if let Some(url) = &self.failure_redirect {
            config.failure_redirect = url.clone();
        }
        config
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<(OrderStoreRef, AuditStoreRef)> {
    use pleatpay::infrastructure::rocksdb::RocksDBStore;

    if let Some(path) = db_path {
        let store = Arc::new(RocksDBStore::open(path).into_diagnostic()?);
        let orders: OrderStoreRef = store.clone();
        let audits: AuditStoreRef = store;
        return Ok((orders, audits));
    }
    Ok(in_memory_stores())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<(OrderStoreRef, AuditStoreRef)> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (OrderStoreRef, AuditStoreRef) {
    let orders: OrderStoreRef = Arc::new(InMemoryOrderStore::new());
    let audits: AuditStoreRef = Arc::new(InMemoryAuditStore::new());
    (orders, audits)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    let config = cli.config();

    let (orders, audits) = open_stores(cli.db_path.as_deref())?;
    let products = Arc::new(InMemoryProductStore::new());
    let carts = Arc::new(InMemoryCartStore::new());
    let coupons = Arc::new(InMemoryCouponStore::new());
    let gateway = Arc::new(SandboxGateway::new());
    let (notifier, outbox) = QueuedNotifier::channel();
    let _delivery = spawn_log_delivery(outbox);

    let deps = Dependencies {
        products: products.clone(),
        carts: carts.clone(),
        coupons: coupons.clone(),
        orders,
        audits,
        notifier: Arc::new(notifier),
        gateway: gateway.clone(),
    };
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let refund_contexts = Arc::new(SessionStore::new(config.refund_context_ttl));
    let payments = Arc::new(PaymentOrchestrator::new(
        config.clone(),
        deps.clone(),
        sessions,
        refund_contexts.clone(),
    ));
    let refunds = Arc::new(RefundOrchestrator::new(config.clone(), deps, refund_contexts));
    let _sweeper = payments.clone().spawn_sweeper();
    let api = CheckoutApi::new(payments, refunds.clone(), config);

    match cli.command {
        Command::Checkout {
            catalog,
            scenario,
            decline_challenge,
            refund,
        } => {
            let file = File::open(catalog).into_diagnostic()?;
            for product in ProductReader::new(file).products() {
                match product {
                    Ok(product) => products.store(product).await.into_diagnostic()?,
                    Err(e) => warn!(error = %e, "skipping catalog row"),
                }
            }

            let file = File::open(scenario).into_diagnostic()?;
            let scenario: Scenario = serde_json::from_reader(file).into_diagnostic()?;
            if let Some(cart) = scenario.cart {
                carts.store(cart).await.into_diagnostic()?;
            }
            for coupon in scenario.coupons {
                coupons.store(coupon).await.into_diagnostic()?;
            }

            let submitted = api.submit_card_payment(scenario.request).await;
            print_step("submit", &submitted)?;
            let Some(challenge) = submitted.data else {
                return Ok(());
            };

            let resolved = if decline_challenge {
                gateway.decline_challenge(&challenge.conversation_id).await
            } else {
                gateway.approve_challenge(&challenge.conversation_id).await
            };
            let payment_id = resolved.ok_or_else(|| {
                miette!(
                    "sandbox gateway has no payment for {}",
                    challenge.conversation_id
                )
            })?;

            let redirect = api
                .three_ds_callback(&payment_id, &challenge.conversation_id)
                .await;
            print_step("callback", &redirect)?;

            if let Some(amount) = refund {
                let refunded = api.refund(&challenge.order_number, amount).await;
                print_step("refund", &refunded)?;
            }
        }
        Command::Refund { identifier, amount } => {
            // The sandbox forgets payments between runs; re-register the stored one.
            if let Ok((target, _)) = refunds.locate(&identifier).await {
                let context = target.context;
                gateway
                    .register_settled_payment(
                        &context.payment_id,
                        &format!("restored-{}", context.order_number),
                        context.charged_amount,
                        vec![context.transaction_id.clone()],
                    )
                    .await;
                info!(order_number = %context.order_number, "restored payment into sandbox gateway");
            }
            let refunded = api.refund(&identifier, amount).await;
            print_step("refund", &refunded)?;
        }
    }

    Ok(())
}
