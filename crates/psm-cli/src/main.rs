use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use psm_core::{
    CommandContext, CommandGroup, CommandInfo, CommandStatus, Config, ExecutionOutcome,
    GlobalOptions, LoggingConfig, SystemEffects,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

mod cli;
mod dispatch;
mod style;

use cli::PsmCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PsmCli::parse();
    let config = Config::from_env().map_err(|err| eyre!("{err:#}"))?;
    init_tracing(&cli, config.logging())?;

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        no_color: cli.no_color,
    };
    let ctx = CommandContext::with_config(&global, config, SystemEffects::shared());
    let (info, outcome) = dispatch::dispatch_command(&ctx, &cli)?;
    let code = emit_output(&cli, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(cli: &PsmCli, logging: &LoggingConfig) -> Result<()> {
    let level = if cli.trace {
        "trace"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = logging.filter.clone().unwrap_or_else(|| {
        format!("psm={level},psm_cli={level},psm_core={level}")
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_level(true);

    let dest = if cli.no_log {
        None
    } else {
        cli.log_dest.as_deref().or(logging.dest.as_deref())
    };
    // A subscriber installed by an embedding process stays in charge.
    let _ = match dest {
        Some(path) => {
            let subscriber = builder
                .with_ansi(false)
                .with_writer(Mutex::new(open_log(path)?))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };
    Ok(())
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| eyre!("cannot open log destination {}: {err}", path.display()))
}

fn emit_output(cli: &PsmCli, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = psm_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        let message = psm_core::format_status_message(info, &outcome.message);
        println!("{}", style.status(outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Hint: {hint}")));
        }
        if let Some(table) = render_services_table(&style, info, &outcome.details) {
            println!("{table}");
        }
    } else if outcome.status != CommandStatus::Ok {
        eprintln!("{}", psm_core::format_status_message(info, &outcome.message));
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

struct ServiceRow {
    key: String,
    service: String,
    scope: String,
    since: String,
    available: bool,
}

fn render_services_table(style: &Style, info: CommandInfo, details: &Value) -> Option<String> {
    if info.group != CommandGroup::Services {
        return None;
    }
    let services = details.get("services")?.as_array()?;
    let mut rows = Vec::new();
    for entry in services {
        let obj = entry.as_object()?;
        rows.push(ServiceRow {
            key: obj.get("key")?.as_str()?.to_string(),
            service: obj
                .get("service_name")
                .and_then(Value::as_str)
                .unwrap_or("(preferences)")
                .to_string(),
            scope: obj.get("scope")?.as_str()?.to_string(),
            since: format!("Darwin {}", obj.get("min_darwin")?.as_u64()?),
            available: obj.get("available")?.as_bool()?,
        });
    }
    Some(format_services_table(style, &rows))
}

fn format_services_table(style: &Style, rows: &[ServiceRow]) -> String {
    let headers = ["Service", "Internal name", "Scope", "Since"];
    let mut widths = headers.map(str::len);
    for row in rows {
        widths[0] = widths[0].max(row.key.len());
        widths[1] = widths[1].max(row.service.len());
        widths[2] = widths[2].max(row.scope.len());
        widths[3] = widths[3].max(row.since.len());
    }
    let line = |cells: [&str; 4]| {
        format!(
            "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        )
    };

    let mut lines = vec![style.table_header(line(headers).trim_end())];
    for row in rows {
        let text = line([&row.key, &row.service, &row.scope, &row.since]);
        let text = text.trim_end();
        lines.push(if row.available {
            text.to_string()
        } else {
            style.dimmed(&format!("{text}  (unavailable)"))
        });
    }
    lines.join("\n")
}
