//! Consistency checker for brassix databases.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use brassix::backend::brass_check::{check_database, DatabaseCheckReport};
use brassix::storage::check::CheckOptions;
use brassix::Config;

#[derive(Parser, Debug)]
#[command(name = "brassix-check", about = "Check a brassix database for corruption")]
struct Args {
    #[arg(help = "Database directory")]
    path: PathBuf,

    #[arg(help = "Only check this table (postlist, termlist, record, ...)")]
    table: Option<String>,

    #[arg(long, help = "Check this committed revision instead of the newest")]
    revision: Option<u32>,

    #[arg(short = 't', help = "Print a short dump of the tree")]
    short_tree: bool,

    #[arg(short = 'f', help = "Print every item of the tree")]
    full_tree: bool,

    #[arg(short = 'b', help = "Print the block usage bitmap")]
    bitmap: bool,

    #[arg(short = 'v', help = "Print table statistics")]
    stats: bool,

    #[arg(long, help = "JSON configuration file")]
    config: Option<PathBuf>,
}

fn print_report(report: &DatabaseCheckReport, stats: bool) {
    for table in &report.tables {
        println!("{}:", table.table);
        for line in &table.output {
            println!("  {}", line);
        }
        if stats {
            println!(
                "  revision {} height {} items {} leaf blocks {} branch blocks {} free blocks {}",
                table.revision, table.height, table.items, table.leaf_blocks, table.branch_blocks, table.free_blocks
            );
        }
        for err in &table.errors {
            println!("  error: {}", err);
        }
        println!("  {} error(s)", table.errors.len());
    }
    for err in &report.errors {
        println!("postlist consistency: {}", err);
    }
    println!("revision {}: {} error(s) in total", report.revision, report.error_count());
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("can't load configuration: {}", e);
                eprintln!("brassix-check: {}", e);
                return ExitCode::from(2);
            }
        },
        None => Config::default(),
    };
    let opts = CheckOptions {
        short_tree: args.short_tree,
        full_tree: args.full_tree,
        show_bitmap: args.bitmap,
        show_stats: args.stats,
    };
    let only: Vec<&str> = args.table.as_deref().into_iter().collect();

    match check_database(&args.path, &config, args.revision, &only, opts) {
        Ok(report) => {
            print_report(&report, args.stats);
            if report.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        Err(e) => {
            eprintln!("brassix-check: {}", e);
            ExitCode::from(2)
        }
    }
}
