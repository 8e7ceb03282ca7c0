//! ledgerscan CLI — inspect scanner defaults and state.
//!
//! Usage:
//! ```bash
//! ledgerscan info
//! ledgerscan version
//! ```

use std::env;
use std::process;

use ledgerscan_core::config::ScannerConfig;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "info" => cmd_info(),
        "version" | "--version" | "-V" => {
            println!("ledgerscan {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("ledgerscan {}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe wallet block scanner\n");
    println!("USAGE:");
    println!("    ledgerscan <COMMAND>\n");
    println!("COMMANDS:");
    println!("    info     Show LedgerScan configuration info");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    let defaults = ScannerConfig::default();
    println!("LedgerScan v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default concurrent extractions: {}", defaults.max_extracting);
    println!("  Default tail rescan depth: {} blocks", defaults.rescan_last_block_count);
    println!("  Default asset decimals: {}", defaults.decimals);
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
}
