//
// main.rs
//

use std::env;

use crossref::cli::{index_stats, inspect, watch};

fn print_usage() {
    println!(
        "crossref {}, an incremental reference index for linked documents.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: crossref <COMMAND> [ARGS]

Available commands:

index-stats <root> [--csv]       Index a directory and print phase timings
query <root> <key>               Print the references of one key as JSON
view <root> <document>           Print a document's incoming and outgoing references as JSON
watch <root>                     Index a directory and follow file changes

Common options:

--policy <id>                    Canonicalization policy (case-insensitive, case-sensitive,
                                 per-source-file, word-stem, basename, unique-source)
--config <file>                  JSON settings file
--version                        Print the version
--help                           Print this help message

"#
    );
}

/// Report an argument error with usage and exit non-zero
fn usage_error(message: String) -> ! {
    eprintln!("Error: {}\n", message);
    print_usage();
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let Some(command) = argv.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "--version" => {
            println!("crossref {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "--help" => {
            print_usage();
            Ok(())
        }
        "index-stats" => {
            let args = index_stats::parse_args(&mut argv).unwrap_or_else(|e| usage_error(e));
            env_logger::init();
            let results = index_stats::run_index_stats(&args).await?;
            if args.csv {
                index_stats::print_results_csv(&results);
            } else {
                index_stats::print_results(&results);
            }
            Ok(())
        }
        "query" => {
            let args = inspect::parse_query_args(&mut argv).unwrap_or_else(|e| usage_error(e));
            env_logger::init();
            inspect::run_query(&args).await
        }
        "view" => {
            let args = inspect::parse_view_args(&mut argv).unwrap_or_else(|e| usage_error(e));
            env_logger::init();
            inspect::run_view(&args).await
        }
        "watch" => {
            let args = watch::parse_args(&mut argv).unwrap_or_else(|e| usage_error(e));
            env_logger::init();
            watch::run_watch(&args).await
        }
        other => Err(anyhow::anyhow!("Unknown command: '{other}'")),
    }
}
