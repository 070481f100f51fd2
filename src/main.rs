use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use ledger_adapter::{
    canonicalize_str, config::Config, ethereum::utils, Contract,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Read;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let contract_args = || {
        [
            Arg::new("address")
                .long("address")
                .value_name("ADDRESS")
                .required(true)
                .help("Contract address"),
            Arg::new("abi")
                .long("abi")
                .value_name("FILE")
                .required(true)
                .help("ABI JSON file (bare array or artifact with an 'abi' member)"),
        ]
    };

    let matches = Command::new("ledger-adapter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Client for a permissioned, fee-less EVM ledger node")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("node-url")
                .short('u')
                .long("node-url")
                .value_name("URL")
                .global(true)
                .help("Node endpoint URL"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("liveness").about("Wait until the node reports it is live"))
        .subcommand(
            Command::new("receipt")
                .about("Wait for a transaction receipt and decode it")
                .arg(Arg::new("tx-hash").required(true).help("Transaction hash"))
                .args(contract_args()),
        )
        .subcommand(
            Command::new("events")
                .about("Query historical contract events")
                .args(contract_args())
                .arg(
                    Arg::new("from-block")
                        .long("from-block")
                        .value_name("BLOCK")
                        .default_value("0")
                        .value_parser(clap::value_parser!(u64))
                        .help("First block of the range"),
                )
                .arg(
                    Arg::new("to-block")
                        .long("to-block")
                        .value_name("BLOCK")
                        .default_value("latest")
                        .help("Last block of the range, a number or a tag"),
                )
                .arg(
                    Arg::new("event")
                        .long("event")
                        .value_name("NAME")
                        .help("Only this event"),
                )
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .value_name("NAME=VALUE")
                        .action(ArgAction::Append)
                        .help("Argument filter, repeatable; requires --event"),
                ),
        )
        .subcommand(
            Command::new("canonicalize")
                .about("Print the canonical form of a JSON document")
                .arg(Arg::new("file").help("JSON file, stdin when omitted")),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    // Needs no node
    if let Some(("canonicalize", sub)) = matches.subcommand() {
        let text = match sub.get_one::<String>("file") {
            Some(file) => tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("Failed to read {}", file))?,
            None => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                text
            }
        };
        println!("{}", canonicalize_str(&text)?);
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;
    if let Some(node_url) = matches.get_one::<String>("node-url") {
        config.node.url = node_url.clone();
    }

    info!("Connecting to {}", config.node.url);
    let connection = config.connect().await?;

    match matches.subcommand() {
        Some(("liveness", _)) => {
            print_json(&serde_json::json!({"url": connection.url(), "live": true}))
        }
        Some(("receipt", sub)) => {
            let contract = load_contract(&connection, sub)
                .await?
                .with_receipt_polling(
                    config.polling.receipt_timeout(),
                    config.polling.receipt_interval(),
                );
            let tx_hash = required(sub, "tx-hash")?;
            print_json(&contract.wait_for_receipt(tx_hash).await?)
        }
        Some(("events", sub)) => {
            let contract = load_contract(&connection, sub).await?;
            let from_block = sub.get_one::<u64>("from-block").copied().unwrap_or(0);
            let to_block = utils::parse_block(required(sub, "to-block")?)?;
            let event = sub.get_one::<String>("event").map(|s| s.as_str());
            let filters = parse_filters(sub)?;
            let records = contract
                .get_events(from_block, to_block, event, filters.as_ref())
                .await?;
            print_json(&records)
        }
        _ => Err(anyhow!(
            "No command given. Run with --help to see the available commands"
        )),
    }
}

async fn load_contract(
    connection: &ledger_adapter::Connection,
    matches: &ArgMatches,
) -> Result<Contract> {
    let abi_path = required(matches, "abi")?;
    let abi_text = tokio::fs::read_to_string(abi_path)
        .await
        .with_context(|| format!("Failed to read ABI file {}", abi_path))?;
    let abi: Value = serde_json::from_str(&abi_text)
        .with_context(|| format!("ABI file {} is not valid JSON", abi_path))?;
    Ok(Contract::new(connection, required(matches, "address")?, &abi)?)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("Missing required argument '{}'", name))
}

/// `--filter name=value`; a value that parses as JSON is used as such, so
/// `--filter 'owner=["0x..","0x.."]'` matches either address.
fn parse_filters(matches: &ArgMatches) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = matches.get_many::<String>("filter") else {
        return Ok(None);
    };

    let mut filters = Map::new();
    for item in raw {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid filter '{}'. Expected NAME=VALUE", item))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        filters.insert(name.to_string(), value);
    }
    Ok(Some(filters))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
