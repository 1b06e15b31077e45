//! 🚀 csvx-cli: the front door, the bouncer, the maitre d' of csvx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads the settings and the schema, sets up logging, lets the library do the
//! heavy lifting, then prints a table of what happened. Or the reason it didn't. 🦆

use std::error::Error;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use csvx::{PipelineError, RunSummary, format_number};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 📥 Bulk-load CSV objects from a bucket (or a directory) into Elasticsearch.
#[derive(Debug, Parser)]
#[command(name = "csvx", version, about)]
struct Cli {
    /// 🔧 Connection settings (JSON or TOML). CSVX_* env vars override it.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// 📐 Schema document: index name, columns, id field.
    #[arg(long, default_value = "metadata.json")]
    schema: PathBuf,

    /// 📦 Documents per bulk request, overriding runtime.batch_size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// 🧪 Read, map and batch everything, send nothing.
    #[arg(long)]
    dry_run: bool,
}

/// 🚀 main(): the "I pressed enter and held my breath" moment.
#[tokio::main]
async fn main() {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let (app_config, schema) = match load(&cli) {
        Ok(loaded) => loaded,
        Err(err) => {
            // 🧅 `{:#}` flattens anyhow's whole chain into one line
            let the_err = PipelineError::Config(format!("{err:#}"));
            report(&the_err);
            std::process::exit(the_err.exit_code());
        }
    };

    match csvx::run(app_config, schema).await {
        Ok(summary) => {
            println!("{}", summary_table(&summary));
            info!(
                "✅ {} documents indexed. Pop the champagne. 🍾",
                format_number(summary.total_indexed())
            );
        }
        Err(err) => {
            report(&err);
            std::process::exit(err.exit_code());
        }
    }
}

/// 🔧 Settings + schema, with the CLI's overrides applied on top.
fn load(cli: &Cli) -> anyhow::Result<(csvx::AppConfig, csvx::SchemaConfig)> {
    // 🔒 a missing settings file is fine as long as the env has everything
    let the_config_file = existing(&cli.config)?;
    let mut app_config = csvx::app_config::load_config(the_config_file).context(
        "💀 couldn't load the connection settings. Make sure you didn't forget something obvious.",
    )?;

    if let Some(batch_size) = cli.batch_size {
        anyhow::ensure!(batch_size > 0, "💀 --batch-size must be at least 1");
        app_config.runtime.batch_size = batch_size;
    }
    if cli.dry_run {
        app_config.runtime.dry_run = true;
    }

    let schema = csvx::app_config::load_schema(&cli.schema)?;
    Ok((app_config, schema))
}

fn existing(path: &Path) -> anyhow::Result<Option<&Path>> {
    let found = path.try_exists().with_context(|| {
        format!(
            "💀 couldn't check whether '{}' exists. If it's a relative path, try an absolute one.",
            path.display()
        )
    })?;
    Ok(found.then_some(path))
}

/// 💀 Log the error and every cause under it, plus a hint when it smells like a network problem.
fn report(err: &PipelineError) {
    error!("💀 error: {}", err);
    let mut the_vibes_are_giving_connection_issues =
        matches!(err, PipelineError::Connection { .. });
    let mut the_cause = err.source();
    while let Some(cause) = the_cause {
        error!("⚠️  cause: {}", cause);
        if looks_like_connection_trouble(&cause.to_string()) {
            the_vibes_are_giving_connection_issues = true;
        }
        the_cause = cause.source();
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like Elasticsearch isn't reachable. Check the url, port and scheme, \
             and that the cluster is actually running. If you're using Docker, `docker ps` \
             will tell you who's home. ☕"
        );
    }
}

fn looks_like_connection_trouble(cause: &str) -> bool {
    cause.contains("error sending request")
        || cause.contains("onnection refused")
        || cause.contains("tcp connect error")
        || cause.contains("dns error")
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "Object", "Index", "Bytes", "Rows", "Indexed", "Rejected", "Batches",
    ]);

    let right = |n: u64| Cell::new(format_number(n)).set_alignment(CellAlignment::Right);
    for report in &summary.objects {
        table.add_row(vec![
            Cell::new(&report.key),
            Cell::new(&report.index),
            match report.bytes {
                Some(bytes) => right(bytes),
                None => Cell::new("-").set_alignment(CellAlignment::Right),
            },
            right(report.rows_read),
            right(report.documents_indexed),
            right(report.documents_rejected),
            right(report.batches),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(""),
        Cell::new(""),
        right(summary.total_rows()),
        right(summary.total_indexed()),
        right(summary.total_rejected()),
        right(summary.total_batches()),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvx::ObjectReport;

    #[test]
    fn the_one_where_the_defaults_match_the_old_file_names() {
        let the_cli = Cli::try_parse_from(["csvx"]).expect("💀 no args should parse");
        assert_eq!(the_cli.config, PathBuf::from("config.json"));
        assert_eq!(the_cli.schema, PathBuf::from("metadata.json"));
        assert_eq!(the_cli.batch_size, None);
        assert!(!the_cli.dry_run);
    }

    #[test]
    fn the_one_where_every_flag_is_spoken_for() {
        let the_cli = Cli::try_parse_from([
            "csvx",
            "--config",
            "prod.toml",
            "--schema",
            "people.json",
            "--batch-size",
            "250",
            "--dry-run",
        ])
        .expect("💀 flags should parse");
        assert_eq!(the_cli.config, PathBuf::from("prod.toml"));
        assert_eq!(the_cli.batch_size, Some(250));
        assert!(the_cli.dry_run);
    }

    #[test]
    fn the_one_where_refused_connections_get_a_hint() {
        assert!(looks_like_connection_trouble(
            "tcp connect error: Connection refused (os error 111)"
        ));
        assert!(!looks_like_connection_trouble("mapper_parsing_exception"));
    }

    #[test]
    fn the_one_where_the_table_has_a_total_row() {
        let the_summary = RunSummary {
            objects: vec![ObjectReport {
                key: "exports/a.csv".to_string(),
                index: "a".to_string(),
                bytes: Some(48_213),
                rows_read: 2500,
                documents_indexed: 2500,
                documents_rejected: 0,
                batches: 3,
            }],
        };
        let the_rendered = summary_table(&the_summary).to_string();
        assert!(the_rendered.contains("exports/a.csv"));
        assert!(the_rendered.contains("2,500"));
        assert!(the_rendered.contains("48,213"));
        assert!(the_rendered.contains("total"));
    }
}
