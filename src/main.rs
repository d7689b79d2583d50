use anyhow::Result;
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ureq::Agent;

use crate::offers::{DEFAULT_WINDOW_HOURS, MAX_WINDOW_HOURS};
use crate::store::Region;

mod mail;
mod offers;
mod store;
mod telegram;
mod utils;

/// Relays free Epic Games Store promotions to Telegram or email.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    region: Region,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Post every currently free game to a Telegram chat, titled in English and Chinese
    Telegram(telegram::Config),
    /// Email free games whose promotion started within the window
    Mail(mail::Config),
    /// Print what would be sent without delivering anything
    Preview {
        /// Use the email selection and rendering
        #[arg(long)]
        mail: bool,
        #[arg(
            long,
            default_value_t = DEFAULT_WINDOW_HOURS,
            value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_HOURS)
        )]
        window_hours: i64,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "freebies=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let agent = utils::agent();

    // delivery problems are reported, never turned into an exit code
    if let Err(e) = run(&agent, cli) {
        error!("{e:#}");
    }
}

fn run(agent: &Agent, cli: Cli) -> Result<()> {
    match cli.command {
        Command::Telegram(config) => telegram::run(agent, &config, &cli.region),
        Command::Mail(config) => mail::run(agent, &config, &cli.region, Utc::now())?,
        Command::Preview { mail, window_hours } => {
            preview(agent, &cli.region, mail, TimeDelta::hours(window_hours))
        }
    }

    Ok(())
}

fn preview(agent: &Agent, region: &Region, email: bool, window: TimeDelta) {
    if email {
        let elements = store::fetch(agent, store::CHINESE, region);
        for freebie in offers::recent(&elements, Utc::now(), window) {
            let letter = mail::letter(&freebie);
            println!("# {}\n\n{}", letter.subject, letter.plain);
        }
    } else {
        let primary = store::fetch(agent, store::ENGLISH, region);
        let secondary = store::fetch(agent, store::CHINESE, region);
        for freebie in offers::bilingual(&primary, &secondary) {
            println!("{}\n", telegram::render(&freebie));
        }
    }
}
