use clap::{ArgAction, Parser, Subcommand};
use ferry_workflow::{
    AliasResolution, BridgeConfig, ConvertOptions, IntegrityOptions, TargetEnvironment, UiGraph,
    convert, resolve_aliases, resolve_target_environment,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "ferry-cli")]
#[command(about = "Converts node-graph workflows into execution-ready API graphs")]
struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Convert(ConvertArgs),
    Inspect(InspectArgs),
    ResolveEnv(ResolveEnvArgs),
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "")]
    target: String,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    driver_dir: Option<PathBuf>,
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long = "reject-dangling", action = ArgAction::SetTrue)]
    reject_dangling: bool,
}

#[derive(clap::Args, Debug)]
struct InspectArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct ResolveEnvArgs {
    #[arg(long)]
    target: String,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Convert(args) => convert_command(args),
        Commands::Inspect(args) => inspect_command(args),
        Commands::ResolveEnv(args) => resolve_env_command(args),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn convert_command(args: ConvertArgs) -> Result<ExitCode, String> {
    let workflow = load_workflow(&args.input)?;
    let options = ConvertOptions {
        bridge: bridge_config(&args),
        integrity: IntegrityOptions {
            reject_dangling_references: args.reject_dangling,
        },
    };

    let graph = convert(&workflow, &args.target, &options).map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&graph).map_err(|e| e.to_string())?;
    match args.output {
        Some(path) => std::fs::write(&path, format!("{json}\n"))
            .map_err(|e| format!("failed writing '{}': {e}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn bridge_config(args: &ConvertArgs) -> BridgeConfig {
    let mut config = BridgeConfig::from_env();
    if let Some(dir) = &args.driver_dir {
        config = config.with_driver_dir(dir);
    }
    if let Some(dir) = &args.scratch_dir {
        config = config.with_scratch_root(dir);
    }
    if let Some(millis) = args.timeout_ms {
        config = config.with_timeout((millis > 0).then(|| Duration::from_millis(millis)));
    }
    config
}

fn inspect_command(args: InspectArgs) -> Result<ExitCode, String> {
    let workflow = load_workflow(&args.input)?;
    let graph = UiGraph::from_value(&workflow).map_err(|e| e.to_string())?;
    let resolution = resolve_aliases(&graph);

    if args.json {
        let json = serde_json::to_string_pretty(&resolution).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        print_resolution(&resolution);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_resolution(resolution: &AliasResolution) {
    println!("aliases: {}", resolution.aliases.len());
    for (name, source) in resolution.aliases.iter() {
        println!("  {name} -> [{}, {}]", source.node_id, source.slot);
    }
    println!(
        "binders: {}",
        resolution
            .binder_ids
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("readers: {}", resolution.reader_names.len());
    for (id, name) in &resolution.reader_names {
        let status = if resolution.aliases.contains(name) {
            "bound"
        } else {
            "unbound"
        };
        println!("  {id} reads {name} ({status})");
    }
}

fn resolve_env_command(args: ResolveEnvArgs) -> Result<ExitCode, String> {
    let Some(environment) = resolve_target_environment(&args.target) else {
        eprintln!("error: target path is empty");
        return Ok(ExitCode::from(2));
    };

    if args.json {
        let json = serde_json::to_string_pretty(&environment).map_err(|e| e.to_string())?;
        println!("{json}");
    } else {
        print_environment(&environment);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_environment(environment: &TargetEnvironment) {
    let optional = |path: &Option<PathBuf>| {
        path.as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<not found>".to_string())
    };
    println!("base_dir: {}", environment.base_dir.display());
    println!("install_dir: {}", environment.install_dir.display());
    println!("interpreter: {}", optional(&environment.interpreter_path));
    println!("embedded_root: {}", optional(&environment.embedded_root));
}

fn load_workflow(path: &Path) -> Result<Value, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed reading workflow '{}': {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid workflow JSON '{}': {e}", path.display()))
}
