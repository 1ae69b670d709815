// src/core/engine.rs
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::TracewrightError;

use super::call_graph::{LanguageType, ProgramExecution};
use super::file_utils::unique_dump_path;
use super::generator::{generate, LevelFilter, OutputKind};
use super::serialization::CallGraphSerializer;

/// Options for one generation run; unset fields fall back to the
/// configured defaults.
#[derive(Debug, Default)]
pub struct GenerateOptions {
    pub level: Option<u32>,
    pub all_levels: bool,
    pub kind: Option<OutputKind>,
    pub output: Option<PathBuf>,
    pub project: Option<String>,
}

/// Main orchestration engine for the command-line tool: load a persisted
/// call graph, generate source for it, write the result.
pub struct Engine {
    config: Config,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(Self { config })
    }

    pub async fn generate(&self, input: &Path, options: GenerateOptions) -> Result<()> {
        let execution = self.load_execution(input)?;

        let filter = if options.all_levels || self.config.generation.all_levels {
            LevelFilter::All
        } else {
            LevelFilter::Exactly(options.level.unwrap_or(self.config.generation.level))
        };
        let kind = match options.kind {
            Some(kind) => kind,
            None => parse_output_kind(&self.config.generation.kind)?,
        };
        let project = options.project.or_else(|| {
            if self.config.project.name.is_empty() {
                None
            } else {
                Some(self.config.project.name.clone())
            }
        });

        info!(
            input = %input.display(),
            kind = ?kind,
            filter = ?filter,
            "generating equivalent source"
        );
        let text = generate(&execution, filter, kind, project.as_deref())?;

        match options.output {
            Some(path) => {
                let target = if self.config.generation.preserve_existing {
                    unique_dump_path(&path)
                } else {
                    path
                };
                std::fs::write(&target, &text)?;
                info!(output = %target.display(), "generated source written");
            }
            None => print!("{text}"),
        }
        Ok(())
    }

    pub async fn inspect(&self, input: &Path) -> Result<()> {
        let execution = self.load_execution(input)?;

        let count_of = |wanted: LanguageType| {
            execution
                .objects()
                .filter(|object| object.language_type() == wanted)
                .count()
        };
        let max_level = execution
            .calls()
            .iter()
            .map(|call| call.level())
            .max()
            .unwrap_or(ProgramExecution::MIN_LEVEL);

        println!("language:  {}", execution.language().as_str());
        println!(
            "objects:   {} ({} modules, {} classes, {} instances)",
            execution.object_count(),
            count_of(LanguageType::Module),
            count_of(LanguageType::Class),
            count_of(LanguageType::Instance),
        );
        println!(
            "calls:     {} (deepest nesting level {})",
            execution.call_count(),
            max_level
        );
        Ok(())
    }

    fn load_execution(&self, input: &Path) -> Result<ProgramExecution> {
        let file = File::open(input)?;
        let execution = CallGraphSerializer::new().load(file)?;
        debug!(
            objects = execution.object_count(),
            calls = execution.call_count(),
            "call graph loaded"
        );
        Ok(execution)
    }
}

fn parse_output_kind(name: &str) -> std::result::Result<OutputKind, TracewrightError> {
    match name {
        "program" => Ok(OutputKind::Program),
        "asserts" => Ok(OutputKind::ProgramWithAsserts),
        "unit-test" => Ok(OutputKind::UnitTest),
        other => Err(TracewrightError::Config(format!(
            "unknown generation kind '{other}' (expected program, asserts or unit-test)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_kind_names_parse() {
        assert_eq!(parse_output_kind("program").unwrap(), OutputKind::Program);
        assert_eq!(
            parse_output_kind("asserts").unwrap(),
            OutputKind::ProgramWithAsserts
        );
        assert_eq!(parse_output_kind("unit-test").unwrap(), OutputKind::UnitTest);
        assert!(parse_output_kind("haiku").is_err());
    }
}
