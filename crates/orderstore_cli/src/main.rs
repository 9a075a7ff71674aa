//! Order store command line entry point.
//!
//! # Usage
//! - `orderstore_cli <config.json> save '<order-json>'`
//! - `orderstore_cli <config.json> get <id>...`
//!
//! Output is pretty JSON on stdout; failures go to stderr with exit code 1.

use log::{error, info};
use orderstore_core::db::ConnectionPool;
use orderstore_core::{
    init_logging_from_config, load_config, InMemoryMetrics, Item, OpContext, Order, OrderId,
    OrderService, PaymentType, SqliteOrderRepository, StoreConfig,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "usage: orderstore_cli <config.json> save '<order-json>'\n       \
                     orderstore_cli <config.json> get <id>...";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateOrderRequest {
    user_id: u64,
    payment_type: String,
    #[serde(default)]
    items: Vec<CreateItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateItemRequest {
    id: u64,
    amount: u64,
    #[serde(default)]
    discount: u64,
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    id: OrderId,
}

#[derive(Debug, Serialize)]
struct CounterEntry {
    name: &'static str,
    count: u64,
}

enum Command {
    Save(String),
    Get(Vec<OrderId>),
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let (config_path, command) = parse_args(args)?;
    let config = load_config(config_path)?;
    init_logging_from_config(&config.logging)?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        orderstore_core::core_version()
    );

    execute(&config, command).map_err(|err| {
        error!("event=cli_run module=cli status=error error={err}");
        err
    })
}

fn execute(config: &StoreConfig, command: Command) -> Result<(), Box<dyn Error>> {
    let pool = ConnectionPool::open(
        &config.database.path,
        config.database.pool_size,
        config.database.busy_timeout(),
    )?;
    let repo = SqliteOrderRepository::try_new(Arc::new(pool))?;
    let metrics = InMemoryMetrics::new();
    let service = OrderService::new(repo, &metrics);
    let ctx = OpContext::background().request_id(format!("cli-{}", std::process::id()));

    match command {
        Command::Save(raw) => {
            let mut order = order_from_json(&raw)?;
            let id = service.create_order(&ctx, &mut order)?;
            print_json(&SaveResponse { id })?;
        }
        Command::Get(ids) => {
            let orders = service.get_orders(&ctx, &ids)?;
            print_json(&orders)?;
        }
    }

    let counters: Vec<CounterEntry> = metrics
        .snapshot()
        .into_iter()
        .map(|(name, count)| CounterEntry { name, count })
        .collect();
    info!(
        "event=cli_metrics module=cli status=ok counters={}",
        serde_json::to_string(&counters)?
    );
    Ok(())
}

fn parse_args(args: &[String]) -> Result<(&str, Command), String> {
    let (config_path, rest) = match args {
        [config_path, rest @ ..] => (config_path.as_str(), rest),
        [] => return Err(USAGE.to_string()),
    };

    let command = match rest {
        [cmd, payload] if cmd == "save" => Command::Save(payload.clone()),
        [cmd, ids @ ..] if cmd == "get" && !ids.is_empty() => {
            let ids = ids
                .iter()
                .map(|raw| {
                    raw.parse::<OrderId>()
                        .map_err(|_| format!("invalid order id `{raw}`"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Command::Get(ids)
        }
        _ => return Err(USAGE.to_string()),
    };
    Ok((config_path, command))
}

fn order_from_json(raw: &str) -> Result<Order, Box<dyn Error>> {
    let request: CreateOrderRequest = serde_json::from_str(raw)?;
    let payment_type = PaymentType::parse(&request.payment_type)
        .ok_or_else(|| format!("unsupported payment_type `{}`", request.payment_type))?;
    let items = request
        .items
        .into_iter()
        .map(|item| Item::new(item.id, item.amount, item.discount))
        .collect();
    Ok(Order::new(request.user_id, payment_type, items))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{execute, order_from_json, parse_args, Command};
    use orderstore_core::{parse_config, PaymentType, StoreConfig};
    use std::path::Path;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn config_for(db_path: &Path) -> StoreConfig {
        let raw = serde_json::json!({ "database": { "path": db_path } }).to_string();
        parse_config(&raw).unwrap()
    }

    #[test]
    fn parse_args_reads_get_ids() {
        let input = args(&["cfg.json", "get", "3", "1"]);
        let (config, command) = parse_args(&input).unwrap();
        assert_eq!(config, "cfg.json");
        match command {
            Command::Get(ids) => assert_eq!(ids, vec![3, 1]),
            Command::Save(_) => panic!("expected get"),
        }
    }

    #[test]
    fn parse_args_rejects_bad_input() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["cfg.json", "get"])).is_err());
        assert!(parse_args(&args(&["cfg.json", "get", "x"])).is_err());
        assert!(parse_args(&args(&["cfg.json", "drop", "1"])).is_err());
    }

    #[test]
    fn order_json_maps_discount_to_discounted_amount() {
        let order = order_from_json(
            r#"{"user_id":7,"payment_type":"wallet","items":[{"id":2,"amount":10,"discount":4}]}"#,
        )
        .unwrap();
        assert_eq!(order.user_id, 7);
        assert_eq!(order.payment_type, PaymentType::Wallet);
        assert_eq!(order.items[0].discounted_amount, 4);
        assert_eq!(order.original_amount, 0);
    }

    #[test]
    fn order_json_rejects_unknown_payment_type() {
        let err = order_from_json(r#"{"user_id":7,"payment_type":"cash","items":[]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("cash"));
    }

    #[test]
    fn execute_saves_then_reads_against_configured_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir.path().join("orders.db"));

        let order = r#"{"user_id":1,"payment_type":"card","items":[{"id":2,"amount":5}]}"#;
        execute(&config, Command::Save(order.to_string())).unwrap();
        execute(&config, Command::Get(vec![1, 2])).unwrap();
    }

    #[test]
    fn execute_reports_unopenable_database_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir.path().join("missing").join("orders.db"));

        assert!(execute(&config, Command::Get(vec![1])).is_err());
    }
}
