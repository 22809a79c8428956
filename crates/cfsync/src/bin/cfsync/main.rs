mod cli;

use cfsync::config::Config;
use cfsync::dependency::DependencyGraph;
use cfsync::services::LocalFileLoader;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("CFSYNC_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Convert(convert_cli) => convert(convert_cli),
        cli::Command::RenderTemplate(render_cli) => render_template(render_cli).await,
        cli::Command::Order(order_cli) => order(order_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn convert(cli: cli::ConvertCommand) -> anyhow::Result<()> {
    let converted = cfsync::commands::convert(&cli.file)?;
    print!("{converted}");
    Ok(())
}

async fn render_template(cli: cli::RenderTemplateCommand) -> anyhow::Result<()> {
    let loader = LocalFileLoader::default();
    let working_dir = std::env::current_dir()?;
    let rendered = cfsync::commands::render_template(&loader, &cli.template, &working_dir).await?;
    println!("{rendered}");
    Ok(())
}

fn order(cli: cli::OrderCommand) -> anyhow::Result<()> {
    let mut config = Config::from_file(&cli.config)?;
    if let Some(suffix) = &cli.suffix {
        config = config.with_suffix(suffix);
    }

    let graph = DependencyGraph::from_stacks(&config.stacks)?;
    if cli.waves {
        output(&cli.output, &graph.waves()?)
    } else {
        output(&cli.output, &graph.order()?)
    }
}

fn output<T: serde::Serialize>(output: &cli::OutputArgs, value: &T) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => {
            serde_json::to_writer_pretty(std::io::stdout(), value)?;
            println!();
        }
    };

    Ok(())
}
