use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use cinepipe::{
    InMemoryOutput, Pipeline, PipelineJob, RecordingTimeDriver, RestoreLedger, SequenceLibrary,
    SettingsRegistry, ShotBuilder, SimulatedRenderSink,
};

#[derive(Parser, Debug)]
#[command(name = "cinepipe", version)]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the shot plan for a job and print it as JSON.
    Plan(Inputs),
    /// Run a job against the simulated renderer, printing one JSON line per completed frame.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct Inputs {
    /// Sequence library JSON.
    #[arg(long)]
    sequences: PathBuf,

    /// Render job JSON.
    #[arg(long)]
    job: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    inputs: Inputs,

    /// Shut the run down as an error after this many ticks.
    #[arg(long)]
    max_ticks: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Plan(args) => cmd_plan(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn load(inputs: &Inputs) -> anyhow::Result<(SequenceLibrary, PipelineJob)> {
    let library = SequenceLibrary::from_json_path(&inputs.sequences)
        .with_context(|| format!("load sequences '{}'", inputs.sequences.display()))?;
    let job = PipelineJob::from_json_path(&inputs.job)
        .with_context(|| format!("load job '{}'", inputs.job.display()))?;
    Ok((library, job))
}

fn cmd_plan(args: Inputs) -> anyhow::Result<()> {
    let (mut library, job) = load(&args)?;
    let registry = SettingsRegistry::builtin();
    let mut ledger = RestoreLedger::new();
    let plan = ShotBuilder::new(&job, &registry)
        .build(&mut library, &mut ledger)
        .with_context(|| format!("build shot plan for job '{}'", job.name))?;
    ledger.restore_all(&mut library)?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let (library, job) = load(&args.inputs)?;
    let job_name = job.name.clone();

    let output = InMemoryOutput::new("memory");
    let frames = output.handle();
    let mut pipeline = Pipeline::new(
        library,
        SettingsRegistry::builtin(),
        Box::new(SimulatedRenderSink::new()),
        vec![Box::new(output)],
    );
    pipeline
        .initialize(Some(job))
        .with_context(|| format!("initialize job '{job_name}'"))?;

    let mut driver = RecordingTimeDriver::new();
    let summary = cinepipe::run_to_completion(&mut pipeline, &mut driver, args.max_ticks)?;

    frames.with(|s| -> anyhow::Result<()> {
        for frame in &s.frames {
            println!("{}", serde_json::to_string(frame)?);
        }
        Ok(())
    })??;
    println!("{}", serde_json::to_string(&summary)?);

    if summary.hit_tick_limit {
        anyhow::bail!("job '{job_name}' stopped after {} ticks", summary.ticks);
    }
    if !summary.success {
        anyhow::bail!("job '{job_name}' failed: {}", pipeline.errors().join("; "));
    }
    Ok(())
}

