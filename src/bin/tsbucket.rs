use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use tsbucket::{Codec, JsonCodec, MsgPackCodec, RedisConnection, SeriesConfig, TimeSeries};

#[derive(Parser, Debug)]
#[command(name = "tsbucket", version, about = "Bucketed time series in Redis sorted sets")]
struct Cli {
    /// Redis URL
    #[arg(long, default_value = "redis://127.0.0.1:6379/0")]
    url: String,

    /// Series configuration file (JSON); overrides --prefix/--width-ms/--expire-secs
    #[arg(long)]
    config: Option<PathBuf>,

    /// Series prefix
    #[arg(long, default_value = "series")]
    prefix: String,

    /// Bucket width in milliseconds
    #[arg(long, default_value_t = 1000)]
    width_ms: u64,

    /// Bucket expiration in seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    expire_secs: u64,

    /// Store points as JSON instead of MessagePack
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a JSON value as a point
    Add {
        value: String,
        /// Point time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the point at an exact time
    Fetch {
        #[arg(long)]
        at: String,
    },
    /// Print every point between two times, inclusive
    Range {
        #[arg(long)]
        begin: String,
        #[arg(long)]
        end: String,
    },
    /// Print the bucket keys a range query would read
    Keys {
        #[arg(long)]
        begin: String,
        #[arg(long)]
        end: String,
    },
}

fn parse_time(value: &str) -> Result<u64> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339)
        .with_context(|| format!("invalid RFC 3339 time '{value}'"))?;
    let nanos = parsed.unix_timestamp_nanos();
    if nanos < 0 {
        bail!("time '{value}' is before the UNIX epoch");
    }
    u64::try_from(nanos).with_context(|| format!("time '{value}' is out of range"))
}

fn format_time(timestamp_ns: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ns))
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok())
        .unwrap_or_else(|| timestamp_ns.to_string())
}

fn series_config(cli: &Cli) -> Result<SeriesConfig> {
    match &cli.config {
        Some(path) => SeriesConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(SeriesConfig::new(
            cli.prefix.clone(),
            Duration::from_millis(cli.width_ms),
            Duration::from_secs(cli.expire_secs),
        )),
    }
}

fn run<K: Codec>(ts: &TimeSeries<RedisConnection, K>, command: &Commands) -> Result<()> {
    let mut out = io::BufWriter::new(io::stdout());
    match command {
        Commands::Add { value, at } => {
            let value: serde_json::Value =
                serde_json::from_str(value).context("value must be JSON")?;
            match at {
                Some(at) => ts.add_at(&value, parse_time(at)?)?,
                None => ts.add_now(&value)?,
            }
        }
        Commands::Fetch { at } => {
            let mut value = serde_json::Value::Null;
            ts.fetch(parse_time(at)?, &mut value)?;
            writeln!(out, "{value}")?;
        }
        Commands::Range { begin, end } => {
            let (begin, end) = (parse_time(begin)?, parse_time(end)?);
            let values: Vec<serde_json::Value> = ts.fetch_range_vec(begin, end)?;
            info!(
                "{} points between {} and {}",
                values.len(),
                format_time(begin),
                format_time(end)
            );
            for value in values {
                writeln!(out, "{value}")?;
            }
        }
        Commands::Keys { begin, end } => {
            for key in ts.bucket_keys(parse_time(begin)?, parse_time(end)?)? {
                writeln!(out, "{key}")?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = series_config(&cli)?;
    info!(
        "series '{}' width {:?} expiration {:?} at {}",
        config.prefix, config.bucket_width, config.expiration, cli.url
    );

    let conn = RedisConnection::open(&cli.url)
        .with_context(|| format!("failed to connect to {}", cli.url))?;
    if cli.json {
        let ts = TimeSeries::with_codec(config, JsonCodec, conn)?;
        run(&ts, &cli.command)
    } else {
        let ts = TimeSeries::with_codec(config, MsgPackCodec, conn)?;
        run(&ts, &cli.command)
    }
}
