use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use anyhow::Result;

use crate::core::{Engine, GenerateOptions, OutputKind};

#[derive(Parser)]
#[command(name = "tracewright")]
#[command(about = "Replays captured call graphs as programs and unit tests")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate equivalent source code from a captured call graph
    Generate {
        /// Call graph JSON file produced by a capture session
        input: PathBuf,

        /// Nesting level to replay (defaults to the top level)
        #[arg(short, long)]
        level: Option<u32>,

        /// Replay every recorded level instead of filtering one
        #[arg(long)]
        all_levels: bool,

        /// Kind of source to generate
        #[arg(short, long, value_enum)]
        kind: Option<GeneratedKind>,

        /// Write the generated source here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Project name, used to name generated test cases
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Summarize a captured call graph
    Inspect {
        /// Call graph JSON file produced by a capture session
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GeneratedKind {
    /// A standalone program replaying the recorded calls
    Program,
    /// A standalone program with inline assertions
    Asserts,
    /// A unit test asserting every recorded outcome
    UnitTest,
}

impl From<GeneratedKind> for OutputKind {
    fn from(kind: GeneratedKind) -> Self {
        match kind {
            GeneratedKind::Program => OutputKind::Program,
            GeneratedKind::Asserts => OutputKind::ProgramWithAsserts,
            GeneratedKind::UnitTest => OutputKind::UnitTest,
        }
    }
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Generate {
                input,
                level,
                all_levels,
                kind,
                output,
                project,
            } => {
                engine
                    .generate(
                        &input,
                        GenerateOptions {
                            level,
                            all_levels,
                            kind: kind.map(OutputKind::from),
                            output,
                            project,
                        },
                    )
                    .await
            }
            Commands::Inspect { input } => engine.inspect(&input).await,
        }
    }
}
