use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::model::parse_day_key;

#[derive(Parser, Debug)]
#[command(
    name = "fitpulse",
    version,
    about = "Track daily fitness tasks and step counts"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "FITPULSE_HOME",
        help = "Directory holding the local store and config.toml"
    )]
    pub data_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "YYYY-MM-DD",
        value_parser = parse_day,
        help = "Treat this calendar day as today"
    )]
    pub today: Option<NaiveDate>,
    #[arg(
        long,
        short = 'y',
        global = true,
        help = "Answer yes to confirmation prompts"
    )]
    pub yes: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Tasks(TaskCommand),
    #[command(subcommand)]
    Steps(StepCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Show today's task progress and step count together.
    Today,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    List,
    Add(TaskAdd),
    Toggle(TaskRef),
    Remove(TaskRef),
    Export(TaskExport),
}

#[derive(Subcommand, Debug)]
pub enum StepCommand {
    Show(StepShow),
    Track(StepTrack),
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    Show,
    Set(ProfileSet),
    Clear,
}

#[derive(Args, Debug)]
pub struct TaskAdd {
    #[arg(value_name = "TITLE", num_args = 1.., required = true)]
    pub words: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TaskRef {
    #[arg(value_name = "ID_OR_TITLE")]
    pub key: String,
}

#[derive(Args, Debug)]
pub struct TaskExport {
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct StepShow {
    #[arg(long, value_name = "KG", help = "Override the profile weight")]
    pub weight: Option<f64>,
}

#[derive(Args, Debug)]
pub struct StepTrack {
    #[arg(
        long,
        value_name = "PATH",
        help = "Read sensor readings from a file instead of stdin"
    )]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ProfileSet {
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long, value_name = "CM")]
    pub height: Option<f64>,
    #[arg(long, value_name = "KG")]
    pub weight: Option<f64>,
}

fn parse_day(value: &str) -> Result<NaiveDate, String> {
    parse_day_key(value).ok_or_else(|| format!("expected YYYY-MM-DD, got `{value}`"))
}
