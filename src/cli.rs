use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::commands;

#[derive(Debug, Parser)]
#[command(name = "primer")]
#[command(about = "Keeps an assistant CLI quota window primed on a daily schedule")]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the priming loop until terminated.
    Daemon,
    /// Send one kickoff message now.
    Kickoff,
    /// Query the quota monitor once and show the parsed reset.
    NextReset,
    /// Show the schedule for a day.
    Schedule(ScheduleArgs),
    /// Show the resolved configuration.
    Config,
    Status,
}

#[derive(Debug, Args, Default)]
pub struct ScheduleArgs {
    /// Day to show, as YYYY-MM-DD. Defaults to today in the configured timezone.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

fn print_report(report: &commands::CommandReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("command: {}", report.command);
    println!("ok: {}", report.ok);
    if !report.details.is_empty() {
        println!("details:");
        for detail in &report.details {
            println!("- {detail}");
        }
    }
    if !report.issues.is_empty() {
        println!("issues:");
        for issue in &report.issues {
            println!("- {issue}");
        }
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match &cli.command {
        Command::Daemon => commands::daemon::run()?,
        Command::Kickoff => commands::kickoff::run()?,
        Command::NextReset => commands::next_reset::run()?,
        Command::Schedule(args) => {
            commands::schedule::run(&commands::schedule::ScheduleOptions { date: args.date })?
        }
        Command::Config => commands::config::run()?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;

    if report.ok {
        Ok(())
    } else {
        std::process::exit(2);
    }
}
