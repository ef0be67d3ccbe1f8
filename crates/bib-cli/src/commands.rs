use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bib_sdk::{
    render_guid, Bibliograph, BibliographConfig, FsStorage, Record, TimeWindow, CONFIG_FILE_NAME,
};
use bib_types::{now_ms, record_from_value, serialize_record};
use chrono::DateTime;
use colored::Colorize;
use serde_json::{json, Value};
use tracing::info;

use crate::cli::*;

type Store = Bibliograph<FsStorage>;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let mut config = BibliographConfig::load(&config_path)?;
    if let Some(storage) = &cli.storage {
        config.storage_path = storage.clone();
    }

    if let Command::ExplainConfig = cli.command {
        return cmd_explain_config(&config, &config_path, cli.format);
    }

    let bib = Bibliograph::with_options(FsStorage::new(&config.storage_path), config.options());
    bib.initialize()
        .await
        .with_context(|| format!("initializing storage at {}", config.storage_path.display()))?;

    let source_or_default = |source: Option<String>| source.unwrap_or_else(|| config.default_source.clone());
    let format = cli.format;

    match cli.command {
        Command::SourceCreate(args) => cmd_source_create(&bib, &args.source, format).await,
        Command::SourceCheck(args) => cmd_source_check(&bib, &args.source, format).await,
        Command::Read(args) => {
            let source = source_or_default(args.source);
            cmd_read(&bib, &source, &args.guid, args.output.as_deref(), format).await
        }
        Command::Write(args) => {
            let source = source_or_default(args.source);
            cmd_write(&bib, &source, &args.input, args.guid_template.as_deref(), format).await
        }
        Command::Delete(args) => {
            let source = source_or_default(args.source);
            cmd_delete(&bib, &source, &args.guid, format).await
        }
        Command::Keys(args) => {
            let source = source_or_default(args.source);
            cmd_keys(&bib, &source, args.from.as_deref(), args.to.as_deref(), format).await
        }
        Command::Metadata(args) => {
            let source = source_or_default(args.source);
            cmd_metadata(&bib, &source, &args.guid, format).await
        }
        Command::History(args) => {
            let source = source_or_default(args.source);
            cmd_history(&bib, &source, &args.guid, format).await
        }
        Command::ExplainConfig => Ok(()),
    }
}

fn cmd_explain_config(config: &BibliographConfig, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let body = config.to_json_pretty()?;
    match format {
        OutputFormat::Json => println!("{body}"),
        OutputFormat::Text => {
            let origin = if path.exists() { "loaded from" } else { "defaults; no file at" };
            println!("Configuration ({} {})", origin, path.display().to_string().bold());
            println!("{body}");
        }
    }
    Ok(())
}

async fn cmd_source_create(bib: &Store, source: &str, format: OutputFormat) -> anyhow::Result<()> {
    info!(source, "creating source");
    bib.create_source(source).await?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "source": source, "created": true })),
        OutputFormat::Text => println!("{} Source {} is ready", "✓".green().bold(), source.yellow()),
    }
    Ok(())
}

async fn cmd_source_check(bib: &Store, source: &str, format: OutputFormat) -> anyhow::Result<()> {
    let exists = bib.source_exists(source).await?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "source": source, "exists": exists })),
        OutputFormat::Text if exists => println!("{} Source {} exists", "✓".green().bold(), source.yellow()),
        OutputFormat::Text => println!("{} Source {} does not exist", "✗".red().bold(), source.yellow()),
    }
    Ok(())
}

async fn cmd_read(
    bib: &Store,
    source: &str,
    guid: &str,
    output: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let Some(record) = bib.read(source, guid).await? else {
        match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Text => println!("Record [{}]:[{}] {}", source, guid, "not found".yellow()),
        }
        return Ok(());
    };

    if let Some(path) = output {
        std::fs::write(path, serialize_record(&record))
            .with_context(|| format!("writing record to {}", path.display()))?;
        info!(source, guid, path = %path.display(), "record written to file");
    }

    match format {
        OutputFormat::Json => println!("{}", serialize_record(&record)),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(())
}

async fn cmd_write(
    bib: &Store,
    source: &str,
    input: &Path,
    guid_template: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let body = std::fs::read_to_string(input)
        .with_context(|| format!("reading input file {}", input.display()))?;
    let records = records_from_input(&body).with_context(|| format!("input file {}", input.display()))?;

    for record in &records {
        let guid = match guid_template {
            Some(template) => render_guid(template, record)?,
            None => bib.record_hash(record),
        };
        let outcome = bib
            .write(source, &guid, record)
            .await
            .with_context(|| format!("writing record [{source}]:[{guid}]"))?;

        match format {
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "guid": guid,
                    "changed": outcome.changed,
                    "delta_appended": outcome.delta_appended,
                    "md5": outcome.metadata.md5,
                })
            ),
            OutputFormat::Text => {
                let status = if outcome.changed { "written".green() } else { "unchanged".dimmed() };
                let delta = if outcome.delta_appended { " +delta" } else { "" };
                println!("  [{}]:[{}] {}{}", source, guid.yellow(), status, delta);
            }
        }
    }

    if format == OutputFormat::Text {
        println!("{} {} record(s) processed", "✓".green().bold(), records.len());
    }
    Ok(())
}

async fn cmd_delete(bib: &Store, source: &str, guid: &str, format: OutputFormat) -> anyhow::Result<()> {
    let tombstone = bib.delete(source, guid).await?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "guid": guid, "deleted": tombstone.as_ref().and_then(|m| m.deleted) })
        ),
        OutputFormat::Text => match tombstone {
            Some(_) => println!("{} Deleted [{}]:[{}]", "✓".green().bold(), source, guid.yellow()),
            None => println!("Record [{}]:[{}] {}", source, guid, "was never written".dimmed()),
        },
    }
    Ok(())
}

async fn cmd_keys(
    bib: &Store,
    source: &str,
    from: Option<&str>,
    to: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let keys = if from.is_none() && to.is_none() {
        bib.list_keys(source).await?
    } else {
        let from = from.map(parse_time).transpose()?.unwrap_or(0);
        let to = match to {
            Some(to) => parse_time(to)?,
            None => now_ms(),
        };
        bib.list_keys_by_time_window(source, TimeWindow::new(from, to)?)
            .await?
    };

    match format {
        OutputFormat::Json => println!("{}", json!(keys)),
        OutputFormat::Text => {
            for key in &keys {
                println!("{key}");
            }
            println!("{} key(s) in {}", keys.len().to_string().bold(), source.yellow());
        }
    }
    Ok(())
}

async fn cmd_metadata(bib: &Store, source: &str, guid: &str, format: OutputFormat) -> anyhow::Result<()> {
    let metadata = bib.read_metadata(source, guid).await?;
    match (format, metadata) {
        (OutputFormat::Json, metadata) => println!("{}", serde_json::to_string(&metadata)?),
        (OutputFormat::Text, None) => println!("Record [{}]:[{}] {}", source, guid, "has no metadata".yellow()),
        (OutputFormat::Text, Some(m)) => {
            println!("GUID:    {}", m.guid.yellow().bold());
            println!("Length:  {}", m.length);
            println!("QHash:   {}", m.qhash.cyan());
            println!("MD5:     {}", m.md5.cyan());
            println!("Ingest:  {}", format_ms(m.ingest));
            if let Some(deleted) = m.deleted {
                println!("Deleted: {}", format_ms(deleted).red());
            }
        }
    }
    Ok(())
}

async fn cmd_history(bib: &Store, source: &str, guid: &str, format: OutputFormat) -> anyhow::Result<()> {
    let history = bib.read_delta(source, guid).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&history)?),
        OutputFormat::Text => {
            if history.is_empty() {
                println!("Record [{}]:[{}] has no history", source, guid.yellow());
            }
            for (i, entry) in history.deltas.iter().enumerate() {
                println!("{} {}", format!("#{}", i + 1).yellow(), format_ms(entry.ingest).dimmed());
                println!("  {}", serialize_record(&entry.delta));
            }
        }
    }
    Ok(())
}

/// Parse a write input: one JSON object, or an array of objects.
fn records_from_input(body: &str) -> anyhow::Result<Vec<Record>> {
    if body.trim().is_empty() {
        bail!("file is empty");
    }
    let value: Value = serde_json::from_str(body).context("file is not valid JSON")?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| record_from_value(item).with_context(|| format!("element {i}")))
            .collect(),
        Value::Object(_) => Ok(vec![record_from_value(value)?]),
        _ => bail!("expected a JSON object or an array of objects"),
    }
}

/// Epoch milliseconds, or an RFC 3339 timestamp.
fn parse_time(raw: &str) -> anyhow::Result<i64> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("`{raw}` is neither epoch milliseconds nor RFC 3339"))?;
    Ok(parsed.timestamp_millis())
}

fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}
