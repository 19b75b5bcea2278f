//! Read loop
//!
//! One line is one program. Results print as rendered, failures print as
//! `E <error>` and the loop carries on. Bindings from `var` persist for the
//! whole session.

use hearth_dsl::config::runtime::{PipelinePreferences, RuntimeConfig};
use hearth_dsl::evaluation::{DeviceStore, Evaluator, Scope};
use hearth_dsl::pipeline::{parse_with_preferences, PipelineError};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

pub const QUIT_COMMAND: &str = ":quit";
const PROMPT: &str = "> ";

/// What one input line produced
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Lines to print, possibly none
    Output(Vec<String>),
    /// Error report, already formatted as `E <error>`
    Failed(String),
    Quit,
}

pub struct Session {
    evaluator: Evaluator,
    scope: Scope,
    pipeline: PipelinePreferences,
    dump_ast: bool,
}

impl Session {
    pub fn new(evaluator: Evaluator, pipeline: PipelinePreferences) -> Self {
        Self {
            evaluator,
            scope: Scope::new(),
            pipeline,
            dump_ast: false,
        }
    }

    /// Evaluation and pipeline settings both come from `config`
    pub fn from_config(store: Arc<dyn DeviceStore>, config: &RuntimeConfig) -> Self {
        let evaluator = Evaluator::with_preferences(store, config.evaluation.clone());
        Self::new(evaluator, config.pipeline.clone())
    }

    /// Print each parsed tree as JSON before evaluating it
    pub fn with_ast_dump(mut self, dump_ast: bool) -> Self {
        self.dump_ast = dump_ast;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn execute_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line == QUIT_COMMAND {
            return LineOutcome::Quit;
        }
        if line.is_empty() {
            return LineOutcome::Output(Vec::new());
        }

        match self.execute(line) {
            Ok(lines) => LineOutcome::Output(lines),
            Err(error) => {
                if error.position().is_none() {
                    hearth_dsl::log_error!(
                        error.error_code(),
                        "Line could not be processed",
                        "error" => &error
                    );
                }
                LineOutcome::Failed(format!("E {}", error))
            }
        }
    }

    fn execute(&mut self, line: &str) -> Result<Vec<String>, PipelineError> {
        let program = parse_with_preferences(line, &self.pipeline)?;

        let mut lines = Vec::new();
        if self.dump_ast {
            match serde_json::to_string_pretty(&program) {
                Ok(json) => lines.push(json),
                Err(error) => hearth_dsl::log_warning!("AST dump failed", "error" => error),
            }
        }

        let result = self.evaluator.program_with_scope(&program, &mut self.scope)?;
        lines.extend(result.render());
        Ok(lines)
    }

    /// Run until `:quit` or end of input
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        output: &mut W,
        interactive: bool,
    ) -> io::Result<()> {
        let mut lines = input.lines();
        loop {
            if interactive {
                write!(output, "{}", PROMPT)?;
                output.flush()?;
            }

            let Some(line) = lines.next().transpose()? else {
                break;
            };

            match self.execute_line(&line) {
                LineOutcome::Quit => break,
                LineOutcome::Output(printed) => {
                    for text in printed {
                        writeln!(output, "{}", text)?;
                    }
                }
                LineOutcome::Failed(report) => writeln!(output, "{}", report)?,
            }
        }

        if interactive {
            writeln!(output)?;
        }
        Ok(())
    }
}
