use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use registry_core::{
    encode_wire, ClientSettings, GrpcPredictionClient, ModelEntry, ModelRegistry, ModelServerClient,
    RestPredictionClient, Tensor, VersionPolicy, DEFAULT_MODEL_PLATFORM,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "registry-ctl", version, about = "Edit a model server's registry file and apply it live")]
pub struct Cli {
    /// Registry file (overrides `registry_file` from settings)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Model server host
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn apply_overrides(&self, settings: &mut ClientSettings) {
        if let Some(file) = &self.file {
            settings.registry_file = file.clone();
        }
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Create an empty registry file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List registered models
    List {
        #[arg(long)]
        json: bool,
    },
    /// Register a model
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        base_path: String,
        #[arg(long, default_value = DEFAULT_MODEL_PLATFORM)]
        platform: String,
        /// Serve the newest N versions
        #[arg(long, conflicts_with_all = ["all_versions", "versions"])]
        latest: Option<u32>,
        /// Serve every version found under the base path
        #[arg(long, conflicts_with = "versions")]
        all_versions: bool,
        /// Serve exactly these versions
        #[arg(long, value_delimiter = ',')]
        versions: Vec<i64>,
        /// Version label, as `label=version`
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, i64)>,
    },
    /// Unregister a model
    Remove {
        #[arg(long)]
        name: String,
    },
    /// Write the registry as a binary ModelServerConfig
    ExportWire {
        #[arg(long)]
        out: PathBuf,
    },
    /// Send the registry to a running model server
    Publish {
        #[arg(long)]
        port: Option<u16>,
        /// Fail on the first error instead of retrying
        #[arg(long)]
        no_retry: bool,
    },
    /// Request a prediction over HTTP+JSON
    Predict {
        #[arg(long)]
        model: String,
        #[arg(long)]
        version: Option<i64>,
        /// JSON array of instances
        #[arg(long)]
        instances: String,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Request a prediction over gRPC with one float input
    PredictGrpc {
        #[arg(long)]
        model: String,
        #[arg(long)]
        version: Option<i64>,
        #[arg(long, default_value = "input")]
        input_name: String,
        #[arg(long, default_value = "output")]
        output_name: String,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        values: Vec<f32>,
        /// Input shape; a vector when omitted
        #[arg(long, value_delimiter = ',')]
        shape: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        output_shape: Vec<i64>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_label(s: &str) -> Result<(String, i64), String> {
    let (label, version) = s.split_once('=').ok_or_else(|| format!("expected label=version, got `{s}`"))?;
    if label.is_empty() {
        return Err("label must not be empty".into());
    }
    let version = version.parse().map_err(|e| format!("bad version in `{s}`: {e}"))?;
    Ok((label.to_string(), version))
}

fn version_policy(latest: Option<u32>, all_versions: bool, versions: Vec<i64>) -> Option<VersionPolicy> {
    match (latest, all_versions, versions.is_empty()) {
        (Some(num_versions), _, _) => Some(VersionPolicy::Latest { num_versions }),
        (None, true, _) => Some(VersionPolicy::All),
        (None, false, false) => Some(VersionPolicy::Specific { versions }),
        (None, false, true) => None,
    }
}

fn open(path: &Path) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    registry
        .load_file(path)
        .with_context(|| format!("loading registry {}", path.display()))?;
    Ok(registry)
}

pub async fn run(command: Command, settings: &ClientSettings) -> Result<()> {
    let path = settings.registry_file.as_path();
    match command {
        Command::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists; pass --force to overwrite", path.display());
            }
            let mut registry = ModelRegistry::new();
            registry.initialize_blank();
            registry.save(path)?;
            println!("initialized {}", path.display());
        }
        Command::List { json } => {
            let registry = open(path)?;
            let models = registry.list_models()?;
            if json {
                println!("{}", serde_json::to_string_pretty(models)?);
            } else {
                println!("{:<24} {:<48} PLATFORM", "NAME", "BASE PATH");
                for m in models {
                    println!("{:<24} {:<48} {}", m.name, m.base_path, m.platform);
                }
            }
        }
        Command::Add { name, base_path, platform, latest, all_versions, versions, labels } => {
            let mut registry = open(path)?;
            let mut entry = ModelEntry::new(name, base_path).with_platform(platform);
            entry.version_policy = version_policy(latest, all_versions, versions);
            entry.version_labels.extend(labels);
            let name = entry.name.clone();
            registry.add_model(entry)?;
            registry.save(path)?;
            println!("added {name}");
        }
        Command::Remove { name } => {
            let mut registry = open(path)?;
            let removed = registry.remove_model(&name)?;
            registry.save(path)?;
            println!("removed {} ({})", removed.name, removed.base_path);
        }
        Command::ExportWire { out } => {
            let registry = open(path)?;
            let bytes = encode_wire(&registry.to_wire()?);
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Command::Publish { port, no_retry } => {
            let registry = open(path)?;
            let config = registry.to_wire()?;
            let mut settings = settings.clone();
            if let Some(port) = port {
                settings.grpc_port = port;
            }
            let retry = if no_retry { registry_core::RetryConfig::none() } else { settings.retry_config() };
            let endpoint = settings.grpc_endpoint();
            let timeout = settings.request_timeout();
            let mut client = ModelServerClient::connect_lazy(&endpoint, timeout)?;
            client.replace_server_config_with_retry(config, &retry).await?;
            info!(%endpoint, models = registry.len()?, "registry published");
            println!("published {} models to {}", registry.len()?, endpoint);
        }
        Command::Predict { model, version, instances, port } => {
            let instances: serde_json::Value = serde_json::from_str(&instances).context("--instances must be JSON")?;
            let base_url = match port {
                Some(port) => format!("http://{}:{}", settings.host, port),
                None => settings.rest_base_url(),
            };
            let client = RestPredictionClient::new(base_url, settings.request_timeout())?;
            let predictions = client.predict(&model, version, instances).await?;
            println!("{}", serde_json::to_string_pretty(&predictions)?);
        }
        Command::PredictGrpc { model, version, input_name, output_name, values, shape, output_shape, port } => {
            let input = if shape.is_empty() { Tensor::vector(values) } else { Tensor::new(shape, values)? };
            let endpoint = format!("http://{}:{}", settings.host, port.unwrap_or(settings.grpc_port));
            let mut client = GrpcPredictionClient::connect(&endpoint, settings.request_timeout()).await?;
            let mut output = client.predict(&model, version, &input_name, &input, &output_name).await?;
            if !output_shape.is_empty() {
                output = output.reshape(output_shape)?;
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
