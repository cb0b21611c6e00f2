//! Runs a compiled script file through the VM.
//!
//! # Usage
//! ```text
//! chainvm <script> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `script`: Path to a bytecode file
//!
//! # Options
//! - `--gas <n>`: Gas limit (defaults to `CHAINVM_GAS_LIMIT`, then the transaction limit)
//! - `--entry <name>`: Context name for the entry script, selecting its storage area
//! - `--db <path>`: Persist storage in a RocksDB database instead of memory
//! - `--estimate`: Dry-run and report the gas required (up to the gas limit), without writing
//! - `--disasm`: Print the decoded instructions and exit
//! - `--quiet`: Only log warnings and errors

use chainvm::core::executor::Executor;
use chainvm::storage::{MemoryStorage, RocksDbStorage, SharedStorage};
use chainvm::utils::log::{Level, set_min_level};
use chainvm::virtual_machine::gas::{GasCategory, TRANSACTION_GAS_LIMIT};
use chainvm::virtual_machine::isa::disassemble;
use chainvm::{error, info};
use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

const GAS_LIMIT_ENV: &str = "CHAINVM_GAS_LIMIT";

struct Options {
    script: String,
    gas_limit: u64,
    entry: Option<String>,
    db: Option<String>,
    estimate: bool,
    disasm: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let options = parse_options(&args);

    let code = match fs::read(&options.script) {
        Ok(code) => code,
        Err(e) => {
            error!("Failed to read {}: {}", options.script, e);
            process::exit(1);
        }
    };

    if options.disasm {
        match disassemble(&code) {
            Ok(ops) => {
                for (offset, op) in ops {
                    println!("{offset:>6}  {op}");
                }
            }
            Err(e) => {
                error!("Malformed script: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let storage: SharedStorage = match &options.db {
        Some(path) => match RocksDbStorage::open(path) {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!("Failed to open database at {}: {}", path, e);
                process::exit(1);
            }
        },
        None => MemoryStorage::shared(),
    };

    let mut executor = Executor::new();
    if let Some(entry) = &options.entry {
        executor = executor.with_entry_name(entry.clone());
    }

    if options.estimate {
        let estimate = executor.estimate(code, options.gas_limit, storage);
        println!("state: {}", estimate.state);
        println!("gas:   {}", estimate.used);
        for category in GasCategory::ALL {
            println!("  {:<14} {}", category.as_str(), estimate.profile.get(category));
        }
        if !estimate.state.is_halt() {
            process::exit(1);
        }
        return;
    }

    info!("Executing {} with gas limit {}", options.script, options.gas_limit);
    let receipt = executor.execute(code, options.gas_limit, storage);

    println!("script:  {}", receipt.script_hash);
    println!("success: {}", receipt.success);
    println!("gas:     {}", receipt.gas_used);
    if let Some(result) = &receipt.result {
        println!("result:  {result}");
    }
    for event in &receipt.events {
        println!("event:   {event}");
    }
    if let Some(fault) = &receipt.fault {
        println!("fault:   {fault}");
    }
    println!("receipt: {}", receipt.hash());

    if !receipt.success {
        process::exit(1);
    }
}

fn parse_options(args: &[String]) -> Options {
    let mut options = Options {
        script: args[1].clone(),
        gas_limit: default_gas_limit(),
        entry: None,
        db: None,
        estimate: false,
        disasm: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--gas" => {
                let value = required_value(args, i, "--gas");
                options.gas_limit = value.parse().unwrap_or_else(|_| {
                    eprintln!("Invalid gas limit: {value}");
                    process::exit(1);
                });
                i += 2;
            }
            "--entry" => {
                options.entry = Some(required_value(args, i, "--entry").to_string());
                i += 2;
            }
            "--db" => {
                options.db = Some(required_value(args, i, "--db").to_string());
                i += 2;
            }
            "--estimate" => {
                options.estimate = true;
                i += 1;
            }
            "--disasm" => {
                options.disasm = true;
                i += 1;
            }
            "--quiet" => {
                set_min_level(Level::Warn);
                i += 1;
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }
    options
}

fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("{flag} requires an argument");
            process::exit(1);
        }
    }
}

fn default_gas_limit() -> u64 {
    match env::var(GAS_LIMIT_ENV) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            eprintln!("Ignoring invalid {GAS_LIMIT_ENV}={value}");
            TRANSACTION_GAS_LIMIT
        }),
        Err(_) => TRANSACTION_GAS_LIMIT,
    }
}

const USAGE: &str = "\
Contract VM runner

USAGE:
    {program} <script> [OPTIONS]

ARGS:
    <script>          Path to a bytecode file

OPTIONS:
    --gas <n>         Gas limit for the run
    --entry <name>    Context name of the entry script (selects its storage area)
    --db <path>       Use a RocksDB database at <path> instead of in-memory storage
    --estimate        Report the gas the script needs, up to the gas limit, without writing storage
    --disasm          Print the decoded instructions and exit
    --quiet           Only log warnings and errors
    -h, --help        Print this help message

ENVIRONMENT:
    CHAINVM_GAS_LIMIT    Default gas limit when --gas is not given
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
