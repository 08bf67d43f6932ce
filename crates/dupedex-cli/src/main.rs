mod commands;
mod logging;
mod progress;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use dupedex_core::compare::{MatchMode, NameQuery};
use dupedex_core::scanner::{ScanOptions, ScanReport};
use dupedex_core::{AppConfig, DupesResult, Engine, Error, ErrorKind, OpenMode};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = logging::init_logger(args.verbose);

    let mut config = match dupedex_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };
    if let Some(index) = &args.index {
        config.index_path = index.clone();
    }
    config.verbose |= args.verbose;

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, config, args.quiet) {
        error!("{:#}", err);
        process::exit(exit_code(&err));
    }
}

/// Exit status by failure kind, so scripts can tell a locked index from a
/// missing path.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>().map(Error::kind) {
        Some(ErrorKind::NotFound) => 2,
        Some(ErrorKind::Locked) => 3,
        Some(ErrorKind::Corrupt) => 4,
        Some(ErrorKind::InvalidInput) => 5,
        Some(ErrorKind::Unsupported) => 6,
        Some(ErrorKind::Io) => 7,
        Some(ErrorKind::Other) | None => 1,
    }
}

fn open_engine(config: &AppConfig, mode: OpenMode, quiet: bool) -> anyhow::Result<Engine> {
    let engine = Engine::open(config.clone(), mode)
        .with_context(|| format!("opening index {}", config.index_path.display()))?;
    Ok(if quiet {
        engine.with_test_mode(true)
    } else {
        engine.with_reporter(Arc::new(CliReporter::new()))
    })
}

fn run(command: Commands, config: AppConfig, quiet: bool) -> anyhow::Result<()> {
    match command {
        Commands::Scan {
            dirs,
            rescan,
            archives,
        } => run_scan(&config, &dirs, ScanOptions { rescan, archives }, quiet),
        Commands::Add { dir } => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let (bucket, created) = engine.add_bucket(&dir)?;
            if created {
                println!("Added bucket {}", bucket.to_string().green());
            } else {
                println!("Bucket {} already exists", bucket.to_string().yellow());
            }
            Ok(())
        }
        Commands::List { bucket } => run_list(&config, bucket.as_deref()),
        Commands::Dupes {
            sources,
            buckets,
            no_update,
            rescan,
            archives,
        } => {
            let result = if no_update {
                let engine = open_engine(&config, OpenMode::ReadOnly, quiet)?;
                engine.compare_indexed(&sources, &buckets)?
            } else {
                let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
                engine.find_duplicates(&sources, &buckets, ScanOptions { rescan, archives })?
            };
            print_dupes(&result, config.verbose);
            Ok(())
        }
        Commands::Search {
            pattern,
            substring,
            ignore_case,
            full_path,
            buckets,
        } => {
            let engine = open_engine(&config, OpenMode::ReadOnly, quiet)?;
            let mode = if substring {
                MatchMode::Substring
            } else {
                MatchMode::Exact
            };
            let query = NameQuery::new(pattern)
                .with_mode(mode)
                .case_sensitive(!ignore_case)
                .full_path(full_path);
            let found = engine.search(&buckets, &query)?;
            for hit in &found {
                println!("{}", hit.path);
            }
            info!("{} matches", format!("{}", found.len()).cyan());
            Ok(())
        }
        Commands::Remove { bucket, yes } => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let prompt = format!("Remove bucket {} and all of its entries?", bucket);
            if !yes && !quiet && !prompt_confirm(&prompt, Some(false))? {
                return Ok(());
            }
            let removed = engine.remove(&bucket)?;
            println!("Removed {} ({} entries)", bucket, removed);
            Ok(())
        }
        Commands::Rename { old, new } => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let moved = engine.rename(&old, &new)?;
            println!("Renamed {} to {} ({} entries)", old, new.green(), moved);
            Ok(())
        }
        Commands::Clean { buckets } => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let report = engine.clean(&buckets)?;
            println!(
                "{} entries examined, {} removed",
                report.examined,
                format!("{}", report.removed).red()
            );
            for (name, err) in &report.bucket_errors {
                warn!("{}: {}", name, err);
            }
            Ok(())
        }
        Commands::Backup { dir } => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let target = engine.backup(dir.as_deref())?;
            println!("Backed up to {}", target.display().to_string().green());
            Ok(())
        }
        Commands::Compact => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let (before, after) = engine.compact()?;
            println!(
                "Compacted: {} -> {} bytes",
                before,
                format!("{}", after).green()
            );
            Ok(())
        }
        Commands::Stats => {
            let engine = open_engine(&config, OpenMode::ReadOnly, quiet)?;
            let stats = engine.stats()?;
            for bucket in &stats.buckets {
                println!(
                    "{:>10} items {:>12} bytes  {}",
                    bucket.items, bucket.stored_bytes, bucket.bucket
                );
            }
            println!(
                "{} buckets, {} bytes on disk",
                format!("{}", stats.bucket_count).cyan(),
                format!("{}", stats.size_on_disk).cyan()
            );
            Ok(())
        }
        Commands::Verify => {
            let status = Engine::verify(&config)?;
            if status.recreated {
                println!("{} index was empty and has been recreated", "!".yellow());
            }
            if status.exists {
                println!(
                    "Index {} ok, {} bytes",
                    config.index_path.display(),
                    status.size_bytes
                );
            } else {
                println!("Index {} does not exist yet", config.index_path.display());
            }
            Ok(())
        }
        Commands::Export { bucket, output } => {
            let engine = open_engine(&config, OpenMode::ReadOnly, quiet)?;
            let rows = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    engine.export(&bucket, BufWriter::new(file))?
                }
                None => engine.export(&bucket, io::stdout().lock())?,
            };
            info!("Exported {} rows", rows);
            Ok(())
        }
        Commands::Import { input, bucket } => {
            let engine = open_engine(&config, OpenMode::ReadWrite, quiet)?;
            let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let report = engine.import(BufReader::new(file), bucket.as_deref())?;
            for err in &report.errors {
                warn!("{}", err);
            }
            println!(
                "Imported {} entries into {} ({} rejected)",
                format!("{}", report.imported).green(),
                report.bucket,
                format!("{}", report.errors.len()).red()
            );
            Ok(())
        }
        Commands::PrintConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn run_scan(
    config: &AppConfig,
    dirs: &[PathBuf],
    opts: ScanOptions,
    quiet: bool,
) -> anyhow::Result<()> {
    let engine = open_engine(config, OpenMode::ReadWrite, quiet)?;
    let reports = engine.scan(dirs, opts)?;
    for report in &reports {
        print_scan_report(report, config.verbose);
    }
    Ok(())
}

fn print_scan_report(report: &ScanReport, verbose: bool) {
    info!(
        "{}: {} files, {} hashed, {} unchanged, {} skipped",
        report.bucket,
        format!("{}", report.visited).green(),
        format!("{}", report.hashed).green(),
        report.unchanged,
        report.skipped,
    );
    if verbose {
        for key in &report.written {
            println!("{} {}", "+".green(), key);
        }
    }
    if report.archives > 0 {
        info!(
            "{} archives, {} members",
            format!("{}", report.archives).cyan(),
            format!("{}", report.members).cyan()
        );
    }
    if !report.errors.is_empty() {
        warn!("{} errors", format!("{}", report.errors.len()).red());
        if verbose {
            for (path, err) in &report.errors {
                warn!("  {}: {}", path.display(), err);
            }
        }
    }
}

fn run_list(config: &AppConfig, bucket: Option<&str>) -> anyhow::Result<()> {
    let engine = open_engine(config, OpenMode::ReadOnly, true)?;
    let mut out = io::stdout().lock();
    match bucket {
        Some(name) => {
            let (bucket, entries) = engine.list(name)?;
            for (path, digest) in &entries {
                writeln!(out, "{}  {}", digest, path)?;
            }
            info!("{}: {} entries", bucket, entries.len());
        }
        None => {
            let stats = engine.stats()?;
            for bucket in &stats.buckets {
                writeln!(out, "{}\t{}", bucket.items, bucket.bucket)?;
            }
        }
    }
    Ok(())
}

fn print_dupes(result: &DupesResult, verbose: bool) {
    for found in result.compare.sorted() {
        println!(
            "{} {} {}",
            found.source.display().to_string().red(),
            "==".dimmed(),
            found.matched
        );
    }
    info!(
        "Index: {}, Compare: {}",
        format!("{:.2}s", result.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.compare_duration.as_secs_f64()).green(),
    );
    info!(
        "{} of {} files already indexed ({} distinct digests)",
        format!("{}", result.compare.matches.len()).red(),
        result.compare.compared,
        result.checksum_count,
    );
    for report in &result.scans {
        if !report.errors.is_empty() {
            warn!("{}: {} errors while scanning", report.bucket, report.errors.len());
        }
    }
    if verbose {
        for (path, err) in &result.compare.errors {
            warn!("{}: {}", path.display(), err);
        }
    }
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
