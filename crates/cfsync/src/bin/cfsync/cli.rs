//! cfsync cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; cfsync ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a yaml file to json or a json file to yaml
    Convert(ConvertCommand),

    /// Print a template with all sentinels rewritten
    #[command(alias = "render")]
    RenderTemplate(RenderTemplateCommand),

    /// Print the order in which the stacks of a configuration are processed
    Order(OrderCommand),
}

#[derive(Parser, Debug)]
pub struct ConvertCommand {
    /// File ending in .yml, .yaml or .json
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RenderTemplateCommand {
    /// Template path or s3 url
    pub template: String,
}

#[derive(Parser, Debug)]
pub struct OrderCommand {
    /// Stack configuration file
    pub config: PathBuf,

    /// Appended to every stack name of the configuration
    #[clap(short = 's', long = "suffix")]
    pub suffix: Option<String>,

    /// Group stacks that can be processed concurrently
    #[clap(short = 'w', long = "waves")]
    pub waves: bool,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
