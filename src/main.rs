mod cli;
mod clock;
mod config;
mod db;
mod entities;
mod error;
mod model;
mod profile;
mod prompt;
mod sensor;
mod steps;
mod store;
mod tasks;
mod util;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use tracing_subscriber::EnvFilter;

use crate::cli::{
    Cli, Command, ProfileCommand, ProfileSet, StepCommand, StepShow, StepTrack, TaskAdd,
    TaskCommand, TaskExport, TaskRef,
};
use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::Config;
use crate::error::AppError;
use crate::model::{DeleteOutcome, ProfileChanges, StepUpdate};
use crate::profile::ProfileStore;
use crate::prompt::{Prompt, TerminalPrompt};
use crate::sensor::{ReplaySensor, ReplaySource};
use crate::steps::StepAccumulator;
use crate::store::SqliteStore;
use crate::tasks::DailyTaskManager;
use crate::util::{
    format_profile, format_step_summary, format_task_list, format_tasks_markdown,
};

const LOG_ENV: &str = "FITPULSE_LOG";
const DEFAULT_DIR_NAME: &str = ".fitpulse";

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        if !err.is_user_facing() {
            tracing::error!(error = %err, "command failed");
        }
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

struct Context {
    store: Arc<SqliteStore>,
    clock: Arc<dyn Clock>,
    config: Config,
    prompt: TerminalPrompt,
}

impl Context {
    fn tasks(&self) -> DailyTaskManager<SqliteStore> {
        DailyTaskManager::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.tasks.daily_count,
        )
    }

    fn steps(&self) -> StepAccumulator<SqliteStore> {
        StepAccumulator::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.steps.clone(),
            self.config.metrics.clone(),
        )
    }

    fn profiles(&self) -> ProfileStore<SqliteStore> {
        ProfileStore::new(self.store.clone())
    }
}

async fn run() -> Result<(), AppError> {
    let matches = Cli::command().get_matches();
    let Cli {
        data_dir,
        today,
        yes,
        command,
    } = Cli::from_arg_matches(&matches).map_err(|err| AppError::InvalidInput(err.to_string()))?;

    let data_dir = resolve_data_dir(data_dir)?;
    let db_path = db::resolve_db_path(&data_dir);
    db::ensure_parent_dir(&db_path)?;
    let config = Config::load(&db::resolve_config_path(&data_dir))?;
    let mut lock = db::open_lock(&db_path)?;
    let _guard = lock.write()?;

    let conn = db::connect(&db_path).await?;
    db::ensure_schema(&conn).await?;
    let clock: Arc<dyn Clock> = match today {
        Some(day) => Arc::new(FixedClock::new(day)),
        None => Arc::new(SystemClock),
    };
    tracing::debug!(data_dir = %data_dir.display(), today = %clock.today(), "store ready");

    let ctx = Context {
        store: Arc::new(SqliteStore::new(conn)),
        clock,
        config,
        prompt: TerminalPrompt::new(yes),
    };

    match command {
        Command::Tasks(command) => handle_tasks(&ctx, command).await,
        Command::Steps(command) => handle_steps(&ctx, command).await,
        Command::Profile(command) => handle_profile(&ctx, command).await,
        Command::Today => handle_today(&ctx).await,
    }
}

async fn handle_tasks(ctx: &Context, command: TaskCommand) -> Result<(), AppError> {
    match command {
        TaskCommand::List => handle_task_list(ctx).await,
        TaskCommand::Add(args) => handle_task_add(ctx, args).await,
        TaskCommand::Toggle(args) => handle_task_toggle(ctx, args).await,
        TaskCommand::Remove(args) => handle_task_remove(ctx, args).await,
        TaskCommand::Export(args) => handle_task_export(ctx, args).await,
    }
}

async fn handle_steps(ctx: &Context, command: StepCommand) -> Result<(), AppError> {
    match command {
        StepCommand::Show(args) => handle_step_show(ctx, args).await,
        StepCommand::Track(args) => handle_step_track(ctx, args).await,
        StepCommand::Reset => handle_step_reset(ctx).await,
    }
}

async fn handle_profile(ctx: &Context, command: ProfileCommand) -> Result<(), AppError> {
    match command {
        ProfileCommand::Show => handle_profile_show(ctx).await,
        ProfileCommand::Set(args) => handle_profile_set(ctx, args).await,
        ProfileCommand::Clear => handle_profile_clear(ctx).await,
    }
}

async fn handle_task_list(ctx: &Context) -> Result<(), AppError> {
    let set = ctx.tasks().load().await;
    println!("{}", format_task_list(&set));
    Ok(())
}

async fn handle_task_add(ctx: &Context, args: TaskAdd) -> Result<(), AppError> {
    let title = args.words.join(" ");
    let task = ctx.tasks().add_custom_task(&title).await?;
    println!("Added task ID: {}: {}", task.id, task.title);
    Ok(())
}

async fn handle_task_toggle(ctx: &Context, args: TaskRef) -> Result<(), AppError> {
    let mut tasks = ctx.tasks();
    let task = require_task(&mut tasks, &args.key).await?;
    let Some(task) = tasks.toggle_complete(&task.id).await else {
        return Err(AppError::NotFound(format!("task {}", args.key)));
    };
    let (done, total) = tasks.summary().await;
    println!(
        "Task \"{}\" marked {}. ({done}/{total} done)",
        task.title,
        task.status_label()
    );
    Ok(())
}

async fn handle_task_remove(ctx: &Context, args: TaskRef) -> Result<(), AppError> {
    let mut tasks = ctx.tasks();
    let task = require_task(&mut tasks, &args.key).await?;
    match tasks.delete_custom_task(&task.id, &ctx.prompt).await {
        DeleteOutcome::Deleted(task) => {
            println!("Removed task: {}", task.title);
            Ok(())
        }
        DeleteOutcome::Cancelled => {
            println!("Cancelled.");
            Ok(())
        }
        DeleteOutcome::NotDeletable => Err(AppError::InvalidInput(format!(
            "\"{}\" is a daily task and cannot be removed",
            task.title
        ))),
        DeleteOutcome::NotFound => Err(AppError::NotFound(format!("task {}", args.key))),
    }
}

async fn handle_task_export(ctx: &Context, args: TaskExport) -> Result<(), AppError> {
    let set = ctx.tasks().load().await;
    db::ensure_parent_dir(&args.path)?;
    fs::write(&args.path, format_tasks_markdown(&set))?;
    println!("Exported tasks for {} to {}", set.date, args.path.display());
    Ok(())
}

async fn require_task(
    tasks: &mut DailyTaskManager<SqliteStore>,
    key: &str,
) -> Result<crate::model::Task, AppError> {
    tasks
        .resolve(key)
        .await
        .ok_or_else(|| AppError::NotFound(format!("task {key}")))
}

async fn handle_step_show(ctx: &Context, args: StepShow) -> Result<(), AppError> {
    let weight = resolve_weight(ctx, args.weight).await?;
    let mut steps = ctx.steps();
    let record = steps.load_record().await;
    let metrics = steps.derive_metrics(weight);
    println!("{}", format_step_summary(&record, &metrics, weight.is_some()));
    Ok(())
}

async fn handle_step_track(ctx: &Context, args: StepTrack) -> Result<(), AppError> {
    let source = match args.input {
        Some(path) => ReplaySource::File(path),
        None => ReplaySource::Stdin,
    };
    let sensor = ReplaySensor::new(source, ctx.clock.clone());
    let mut steps = ctx.steps();
    let subscription = match steps.initialize(&sensor).await {
        Ok(subscription) => subscription,
        Err(AppError::SensorUnavailable(message)) => {
            ctx.prompt.alert("Step sensor unavailable", &message);
            println!("Steps today: {}", steps.count());
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let summary = steps
        .track(subscription, shutdown, |event, update| match update {
            StepUpdate::Accepted { delta, count } => println!("+{delta} steps (total {count})"),
            StepUpdate::Dropped(reason) => {
                tracing::debug!(raw = event.steps, reason = reason.as_str(), "reading dropped")
            }
        })
        .await;

    println!(
        "Tracked {} readings ({} dropped). Steps today: {}",
        summary.accepted + summary.dropped,
        summary.dropped,
        steps.count()
    );
    Ok(())
}

async fn handle_step_reset(ctx: &Context) -> Result<(), AppError> {
    if !ctx
        .prompt
        .confirm("Reset Steps", "Reset today's step count to 0?")
    {
        println!("Cancelled.");
        return Ok(());
    }
    let mut steps = ctx.steps();
    steps.load_record().await;
    steps.reset().await;
    println!("Step count reset.");
    Ok(())
}

async fn handle_profile_show(ctx: &Context) -> Result<(), AppError> {
    let profile = ctx.profiles().load().await;
    println!("{}", format_profile(&profile));
    Ok(())
}

async fn handle_profile_set(ctx: &Context, args: ProfileSet) -> Result<(), AppError> {
    if args.username.is_none() && args.height.is_none() && args.weight.is_none() {
        return Err(AppError::InvalidInput(
            "profile set requires --username, --height or --weight".to_string(),
        ));
    }
    let profile = ctx
        .profiles()
        .save(ProfileChanges {
            username: args.username,
            height_cm: args.height,
            weight_kg: args.weight,
        })
        .await?;
    println!("Profile updated.");
    println!("{}", format_profile(&profile));
    Ok(())
}

async fn handle_profile_clear(ctx: &Context) -> Result<(), AppError> {
    ctx.profiles().clear().await;
    println!("Profile cleared.");
    Ok(())
}

async fn handle_today(ctx: &Context) -> Result<(), AppError> {
    let set = ctx.tasks().load().await;
    let weight = resolve_weight(ctx, None).await?;
    let mut steps = ctx.steps();
    let record = steps.load_record().await;
    let metrics = steps.derive_metrics(weight);

    println!("{}", format_task_list(&set));
    println!();
    println!("{}", format_step_summary(&record, &metrics, weight.is_some()));
    Ok(())
}

async fn resolve_weight(ctx: &Context, explicit: Option<f64>) -> Result<Option<f64>, AppError> {
    if let Some(weight) = explicit {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(AppError::Validation(
                "weight must be a positive number".to_string(),
            ));
        }
        return Ok(Some(weight));
    }
    Ok(ctx.profiles().load().await.weight_kg)
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(dir) = data_dir {
        if dir.as_os_str().is_empty() {
            return Err(AppError::InvalidInput("--data-dir is empty".to_string()));
        }
        return Ok(dir);
    }
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => Ok(PathBuf::from(home).join(DEFAULT_DIR_NAME)),
        _ => Err(AppError::InvalidInput(
            "unable to resolve a data directory; set --data-dir or FITPULSE_HOME".to_string(),
        )),
    }
}
