use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use skein_core::domain::{NodeId, Payload, TaskError};
use skein_core::impls::InMemoryTaskQueue;
use skein_core::typed::{Endpoint, Handler, Signature};
use skein_core::{
    ChainSpec, Engine, EngineConfig, GroupSpec, Inbound, QueueWorker, TaskSpec, WorkerGroup,
    WorkflowSpec,
};

/// skein - workflow orchestration over a task queue
#[derive(Parser)]
#[command(name = "skein")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demonstration workflow against the in-memory queue
    Demo {
        #[arg(value_enum)]
        workflow: Demo,

        /// Execute tasks inline instead of through the queue
        #[arg(long)]
        debug: bool,

        /// Engine configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Local queue workers
        #[arg(long, default_value_t = 2)]
        workers: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Demo {
    /// sum(a=4, b=5) then sum(b=10)
    Chain,
    /// [sum(3, 3), sum(7, 2)] then total
    Group,
    /// a chain whose second step fails, with an error callback
    Failure,
}

#[derive(Deserialize)]
struct Sum {
    a: i64,
    b: i64,
}

impl Endpoint for Sum {
    const NAME: &'static str = "sum";

    fn signature() -> Signature {
        Signature::new().required("a").required("b")
    }
}

struct SumHandler;

#[async_trait]
impl Handler<Sum> for SumHandler {
    type Output = i64;

    async fn handle(&self, args: Sum) -> Result<i64, TaskError> {
        Ok(args.a + args.b)
    }
}

fn total(payload: Payload) -> Result<Value, TaskError> {
    let values = payload
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| TaskError::new("values must be an array"))?;
    Ok(json!(values.iter().filter_map(Value::as_i64).sum::<i64>()))
}

fn explode(payload: Payload) -> Result<Value, TaskError> {
    Err(TaskError::new(format!(
        "refusing to handle {}",
        Value::Object(payload)
    )))
}

fn notify(payload: Payload) -> Result<Value, TaskError> {
    info!(
        task = %payload.get("task_id").unwrap_or(&serde_json::Value::Null),
        error = %payload.get("error").unwrap_or(&serde_json::Value::Null),
        "failure reported"
    );
    Ok(Value::Null)
}

fn workflow(demo: Demo) -> WorkflowSpec {
    match demo {
        Demo::Chain => ChainSpec::new([
            TaskSpec::new("sum").arg("a", 4).arg("b", 5),
            TaskSpec::new("sum").arg("b", 10),
        ])
        .into(),
        Demo::Group => GroupSpec::default()
            .member(TaskSpec::new("sum").arg("a", 3).arg("b", 3))
            .member(TaskSpec::new("sum").arg("a", 7).arg("b", 2))
            .then(TaskSpec::new("total"))
            .into(),
        Demo::Failure => ChainSpec::new([
            TaskSpec::new("sum").arg("a", 1).arg("b", 2),
            TaskSpec::new("explode").on_error("notify"),
            TaskSpec::new("sum").arg("b", 1),
        ])
        .into(),
    }
}

/// Fill what production mode needs with local values.
fn local_config(mut config: EngineConfig) -> EngineConfig {
    config.project.get_or_insert_with(|| "local".into());
    config.location.get_or_insert_with(|| "local".into());
    config.queue.get_or_insert_with(|| "skein-demo".into());
    config
        .base_url
        .get_or_insert_with(|| "http://127.0.0.1:8000".into());
    config
}

fn load_config(path: Option<PathBuf>, debug: bool) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let mut config = local_config(config.with_env_overrides()?);
    config.debug |= debug;
    Ok(config)
}

async fn wait_until_settled(
    engine: &Engine,
    queue: &InMemoryTaskQueue,
    root: NodeId,
) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if engine.status(root).await?.is_terminal() && queue.pending().await == 0 {
            // let in-flight callbacks report
            sleep(Duration::from_millis(50)).await;
            return Ok(());
        }
        if Instant::now() > deadline {
            bail!("workflow {root} did not finish in time");
        }
        sleep(Duration::from_millis(10)).await;
    }
}

async fn run_demo(demo: Demo, config: EngineConfig, workers: usize) -> Result<()> {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let engine = Engine::builder()
        .register::<Sum, _>(SumHandler)?
        .register_fn("total", Signature::new().required("values"), total)?
        .register_fn("explode", Signature::new(), explode)?
        .register_fn(
            "notify",
            Signature::new()
                .required("task_id")
                .required("task_name")
                .required("error")
                .optional("payload"),
            notify,
        )?
        .expect_endpoints(&["sum", "total", "explode", "notify"])
        .config(config)
        .queue(queue.clone())
        .build()?;

    let group = (!engine.is_debug()).then(|| {
        WorkerGroup::spawn(
            workers.max(1),
            QueueWorker::new(queue.clone(), Inbound::new(engine.clone())),
        )
    });

    let root = engine.run(&workflow(demo)).await?;
    info!(root = %root, ?demo, "demo workflow submitted");

    if let Some(group) = group {
        let settled = wait_until_settled(&engine, &queue, root).await;
        group.shutdown_and_join().await;
        settled?;
    }

    let statuses = engine.graph(root).await?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo {
            workflow,
            debug,
            config,
            workers,
        } => {
            let config = load_config(config, debug)?;
            run_demo(workflow, config, workers).await?;
        }
    }
    Ok(())
}
