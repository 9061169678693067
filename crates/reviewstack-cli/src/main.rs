use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "reviewstack",
    about = "reviewstack: topology composer for the code review pipeline",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the topology and print it
    Synth {
        /// Deployment parameters (reviewstack.toml)
        #[arg(short, long, default_value = "reviewstack.toml")]
        config: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Also write the JSON topology to this file
        #[arg(short, long)]
        out: Option<String>,
    },
    /// Classify the deployment transition against a previous topology.
    ///
    /// Without --previous the transition is a create. The plan lists
    /// resource, grant and environment changes and whether the data
    /// initializer will run.
    Plan {
        #[arg(short, long, default_value = "reviewstack.toml")]
        config: String,
        /// JSON topology written by an earlier `synth --out`
        #[arg(short, long)]
        previous: Option<String>,
        /// Plan the deletion of --previous instead of a deployment
        #[arg(long)]
        destroy: bool,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print endpoint, API key id, and how to fetch the key value
    Outputs {
        #[arg(short, long, default_value = "reviewstack.toml")]
        config: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reviewstack=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { config, format, out } => {
            commands::synth::synth(&config, &format, out.as_deref())
        }
        Commands::Plan {
            config,
            previous,
            destroy,
            format,
        } => commands::plan::plan(&config, previous.as_deref(), destroy, &format),
        Commands::Outputs { config } => commands::outputs::outputs(&config),
    }
}
