use crate::aggregation::{ComparedSet, GatherOptions, Gathered, Set};
use crate::cli::commands::{
    AssociationArgs, Commands, CompareCommand, EngineArgs, GatherCommand, LatestCommand, PurgeCommand,
    RecordCommand, WindowArgs,
};
use crate::config::RollupConfig;
use crate::engine::Engine;
use crate::error::RollupError;
use crate::history::LatestOptions;
use crate::metric::RecordOptions;
use crate::types::{Associations, MetricType};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Load configuration and build the engine the subcommands run against.
pub fn load_engine(args: &EngineArgs) -> Result<Engine> {
    let mut config = RollupConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = &args.database {
        config.storage.connection = database.clone();
    }
    debug!(connection = %config.storage.connection, "Loaded configuration");
    Ok(Engine::from_config(&config, None)?)
}

/// Run one subcommand, returning its JSON output.
pub async fn handle_command(engine: &Engine, command: Commands) -> Result<Value> {
    match command {
        Commands::Init => {
            engine.init().await?;
            info!("Initialized metrics storage");
            Ok(json!({ "status": "ok" }))
        }
        Commands::Types => Ok(handle_types(engine)),
        Commands::Record(cmd) => handle_record(engine, cmd).await,
        Commands::Latest(cmd) => handle_latest(engine, cmd).await,
        Commands::Gather(cmd) => handle_gather(engine, cmd).await,
        Commands::Compare(cmd) => handle_compare(engine, cmd).await,
        Commands::Purge(cmd) => handle_purge(engine, cmd).await,
    }
}

fn handle_types(engine: &Engine) -> Value {
    let types: Vec<Value> = engine
        .registry()
        .iter()
        .map(|ty| {
            let associations: Vec<Value> = ty
                .associations()
                .iter()
                .map(|assoc| json!({ "slot": assoc.slot, "name": assoc.name, "required": assoc.required }))
                .collect();
            json!({
                "id": ty.id(),
                "name": ty.name(),
                "cumulative": ty.cumulative(),
                "associations": associations,
            })
        })
        .collect();
    Value::Array(types)
}

async fn handle_record(engine: &Engine, cmd: RecordCommand) -> Result<Value> {
    let metric_type = resolve_type(engine, &cmd.metric_type.metric_type)?;
    let mut options = RecordOptions::new().associations(associations(&cmd.associations));
    if let Some(amount) = cmd.amount {
        options = options.amount(amount);
    }
    if let Some(time) = cmd.time {
        options = options.time(time);
    }

    engine.init().await?;
    let metric = engine.record(metric_type.as_ref(), options).await?;
    Ok(serde_json::to_value(metric)?)
}

async fn handle_latest(engine: &Engine, cmd: LatestCommand) -> Result<Value> {
    let metric_type = resolve_type(engine, &cmd.metric_type.metric_type)?;
    let mut options = LatestOptions::new().associations(associations(&cmd.associations));
    options.before = cmd.before;
    options.after = cmd.after;

    engine.init().await?;
    let latest = engine.latest(metric_type.as_ref(), &options).await?;
    Ok(json!({ "type": metric_type.name(), "latest": latest }))
}

async fn handle_gather(engine: &Engine, cmd: GatherCommand) -> Result<Value> {
    let metric_type = resolve_type(engine, &cmd.window.metric_type.metric_type)?;
    let mut options = gather_options(&cmd.window);
    if let Some(group_by) = cmd.group_by {
        options = options.group_by(group_by);
    }

    engine.init().await?;
    match engine.gather(&metric_type, cmd.window.group, options).await? {
        Gathered::Single(set) => set_json(&set, cmd.sparse).await,
        Gathered::Grouped(groups) => {
            // An array keeps ids and labels that print alike apart
            let mut output = Vec::with_capacity(groups.len());
            for (key, set) in groups {
                let set = set_json(&set, cmd.sparse).await?;
                output.push(json!({ "key": key, "set": set }));
            }
            Ok(Value::Array(output))
        }
    }
}

async fn handle_compare(engine: &Engine, cmd: CompareCommand) -> Result<Value> {
    let metric_type = resolve_type(engine, &cmd.window.metric_type.metric_type)?;
    let options = gather_options(&cmd.window);

    engine.init().await?;
    let compared = engine.compare(&metric_type, cmd.window.group, options).await?;
    Ok(compared_json(&compared))
}

async fn handle_purge(engine: &Engine, cmd: PurgeCommand) -> Result<Value> {
    let type_id = match &cmd.metric_type {
        Some(name) => Some(resolve_type(engine, name)?.id().unwrap_or_default()),
        None => None,
    };
    engine.init().await?;
    let deleted = engine.purge(type_id).await?;
    Ok(json!({ "deleted": deleted }))
}

/// Find a registered type by id, falling back to its name.
fn resolve_type(engine: &Engine, value: &str) -> Result<Arc<dyn MetricType>> {
    if let Ok(id) = value.parse::<i32>() {
        return Ok(engine.metric_type(id)?);
    }
    engine.registry().find_by_name(value).ok_or_else(|| {
        RollupError::InvalidMetricType(format!("No metric type named {value} is configured")).into()
    })
}

fn associations(args: &AssociationArgs) -> Associations {
    args.associations.iter().cloned().collect()
}

fn gather_options(args: &WindowArgs) -> GatherOptions {
    let mut options = GatherOptions::new().associations(associations(&args.associations));
    options.quantity = args.quantity;
    options.end_time = args.end_time;
    options
}

async fn set_json(set: &Set, sparse: bool) -> Result<Value> {
    let points = if sparse { set.points() } else { set.filled().await? };
    Ok(json!({
        "type": set.metric_type().name(),
        "group": set.group(),
        "quantity": set.quantity(),
        "start_time": set.start_time(),
        "end_time": set.end_time(),
        "points": points,
    }))
}

fn compared_json(compared: &ComparedSet) -> Value {
    let points: Vec<Value> = compared
        .points()
        .iter()
        .map(|point| {
            json!({
                "time": point.time(),
                "previous_time": point.b.time,
                "sum": point.sum(),
                "count": point.count(),
                "last": point.last(),
            })
        })
        .collect();
    json!({
        "type": compared.a().metric_type().name(),
        "group": compared.a().group(),
        "start_time": compared.a().start_time(),
        "previous_start_time": compared.b().start_time(),
        "points": points,
    })
}
