use anyhow::{bail, Context, Result};
use cadence_core::{CadenceConfig, CadenceError};
use cadence_schedules::{
    parse_time_zone, Occurrences, Schedule, ScheduleContext, ScheduleDef, ScheduleResult,
    END_OF_TIME, START_OF_TIME,
};
use cadence_timer::{Firing, Timer};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Evaluate calendar schedules and fire jobs when they come due",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $CADENCE_CONFIG or ~/.cadence/cadence.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the next occurrences of a schedule
    Next {
        /// Inline JSON definition, e.g. '{"kind":"weekly","on":"Fri"}'
        #[arg(long, conflicts_with = "job", required_unless_present = "job")]
        schedule: Option<String>,

        /// Name of a configured job
        #[arg(long)]
        job: Option<String>,

        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// IANA time zone, overriding the config
        #[arg(long)]
        tz: Option<String>,

        /// Number of occurrences to print
        #[arg(long, default_value = "5")]
        count: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List configured jobs and when each is next due
    Jobs {
        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run the timer until Ctrl-C, printing each firing as a JSON line
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_timer=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = dispatch(cli).await;
    if let Err(e) = &result {
        if let Some(cadence) = e.downcast_ref::<CadenceError>() {
            error!(code = cadence.code(), "{cadence}");
        }
    }
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Next {
            schedule,
            job,
            at,
            tz,
            count,
            json,
        } => {
            let (schedule, zone) = resolve_schedule(config_path, schedule, job, tz)?;
            next(&*schedule, zone, at, count, json)
        }
        Commands::Jobs { at, json } => jobs(&CadenceConfig::load(config_path)?, at, json),
        Commands::Run => run(&CadenceConfig::load(config_path)?).await,
    }
}

/// The schedule and zone `cadence next` evaluates. The config is only read
/// when an inline definition and an explicit zone do not already say both.
fn resolve_schedule(
    config_path: Option<&str>,
    schedule: Option<String>,
    job: Option<String>,
    tz: Option<String>,
) -> Result<(Box<dyn Schedule>, Tz)> {
    let explicit_zone = tz.as_deref().map(parse_time_zone).transpose()?;
    match (schedule, job) {
        (Some(definition), _) => {
            let def: ScheduleDef = serde_json::from_str(&definition)
                .context("invalid --schedule definition")?;
            let schedule = def.build()?;
            let zone = match explicit_zone {
                Some(zone) => zone,
                None => CadenceConfig::load(config_path)?.time_zone()?,
            };
            Ok((schedule, zone))
        }
        (None, Some(name)) => {
            let config = CadenceConfig::load(config_path)?;
            let job = config.job(&name)?;
            let zone = match explicit_zone {
                Some(zone) => zone,
                None => job.time_zone(config.time_zone()?)?,
            };
            Ok((job.schedule.build()?, zone))
        }
        (None, None) => bail!("either --schedule or --job is required"),
    }
}

fn next(
    schedule: &dyn Schedule,
    zone: Tz,
    at: Option<DateTime<Utc>>,
    count: usize,
    json: bool,
) -> Result<()> {
    let context = ScheduleContext::new(at.unwrap_or_else(Utc::now)).with_time_zone(zone);
    let occurrences = Occurrences::new(schedule, context)
        .take(count)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&occurrences)?);
    } else if occurrences.is_empty() {
        println!("{schedule}: no further occurrences");
    } else {
        println!("{schedule} ({zone})");
        for due in &occurrences {
            println!("  {}", describe(due, zone));
        }
    }
    Ok(())
}

fn jobs(config: &CadenceConfig, at: Option<DateTime<Utc>>, json: bool) -> Result<()> {
    let timer = Timer::from_config(config, None, at.unwrap_or_else(Utc::now))?;

    if json {
        let states: Vec<_> = timer.jobs().collect();
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(());
    }
    if timer.jobs().next().is_none() {
        println!("no enabled jobs");
        return Ok(());
    }
    for state in timer.jobs() {
        let zone: Tz = parse_time_zone(&state.time_zone)?;
        let due = state
            .current
            .map(|due| describe(&due, zone))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} {:<10} {}", state.name, state.status, due);
        println!("{:<20} {}", "", state.schedule);
    }
    Ok(())
}

async fn run(config: &CadenceConfig) -> Result<()> {
    let (fired_tx, mut fired_rx) = mpsc::channel::<Firing>(config.timer.channel_capacity);
    let timer = Timer::from_config(config, Some(fired_tx), Utc::now())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine = tokio::spawn(timer.run(shutdown_rx));

    let printer = tokio::spawn(async move {
        while let Some(firing) = fired_rx.recv().await {
            match serde_json::to_string(&firing) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(job_id = %firing.job_id, "failed to encode firing: {e}"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("received Ctrl-C, shutting down");

    // signal the timer to stop; the printer drains once the timer drops its sender
    let _ = shutdown_tx.send(true);
    engine.await?;
    printer.await?;
    Ok(())
}

/// `from -> to` on the zone's wall clock.
fn describe(due: &ScheduleResult, zone: Tz) -> String {
    let from = stamp(due.from(), zone);
    if due.interval().is_point() {
        format!("at {from}")
    } else {
        format!("{from} -> {}", stamp(due.to(), zone))
    }
}

fn stamp(date: DateTime<Utc>, zone: Tz) -> String {
    if date == START_OF_TIME {
        "the beginning of time".to_string()
    } else if date == END_OF_TIME {
        "the end of time".to_string()
    } else {
        date.with_timezone(&zone)
            .format("%a %Y-%m-%d %H:%M %Z")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_schedules::Interval;
    use chrono::TimeZone;

    #[test]
    fn next_requires_a_schedule_or_a_job() {
        assert!(Cli::try_parse_from(["cadence", "next"]).is_err());
        assert!(Cli::try_parse_from(["cadence", "next", "--job", "a", "--schedule", "{}"]).is_err());

        let cli = Cli::try_parse_from([
            "cadence",
            "next",
            "--job",
            "standup",
            "--at",
            "2024-06-12T10:00:00Z",
            "--count",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Next { job, at, count, .. } => {
                assert_eq!(job.as_deref(), Some("standup"));
                assert_eq!(at, Some(Utc.with_ymd_and_hms(2024, 6, 12, 10, 0, 0).unwrap()));
                assert_eq!(count, 3);
            }
            _ => panic!("expected next"),
        }
    }

    #[test]
    fn inline_schedules_with_a_zone_do_not_read_the_config() {
        let missing = Some("/nonexistent/cadence/cadence.toml");
        let (schedule, zone) = resolve_schedule(
            missing,
            Some(r#"{"kind":"weekly","on":"Fri"}"#.to_string()),
            None,
            Some("Europe/London".to_string()),
        )
        .unwrap();
        assert_eq!(zone, chrono_tz::Europe::London);
        assert_eq!(schedule.to_string(), "weekly on Fri");

        let err = resolve_schedule(missing, None, Some("standup".to_string()), None).unwrap_err();
        assert!(err.downcast_ref::<CadenceError>().is_some());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["cadence", "jobs", "--config", "/tmp/cadence.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/cadence.toml"));
    }

    #[test]
    fn describes_intervals_on_the_local_clock() {
        let from = Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 6, 12, 8, 0, 0).unwrap();
        let due = ScheduleResult::new(Interval::new(from, to));
        assert_eq!(
            describe(&due, chrono_tz::Asia::Tokyo),
            "Wed 2024-06-12 09:00 JST -> Wed 2024-06-12 17:00 JST"
        );
        assert_eq!(
            describe(&ScheduleResult::new(Interval::at(from)), Tz::UTC),
            "at Wed 2024-06-12 00:00 UTC"
        );
    }
}
