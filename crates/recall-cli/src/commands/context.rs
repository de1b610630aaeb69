use clap::Parser;

use crate::error::CliResult;
use crate::output::OutputFormat;
use crate::workspace::Workspace;

#[derive(Parser)]
pub struct ContextCommand {
    #[clap(help = "Entity to assemble context for")]
    pub entity: String,

    #[clap(long, short, default_value = "", help = "Query passed through to the assembler")]
    pub query: String,

    #[clap(long, short, help = "Character ceiling (defaults to [context] max_chars)")]
    pub max_chars: Option<usize>,
}

impl ContextCommand {
    pub async fn execute(&self, workspace: &Workspace, format: OutputFormat) -> CliResult<()> {
        let engine = workspace.load(&self.entity)?;
        let max_chars = self
            .max_chars
            .unwrap_or(workspace.config().context.max_chars);
        let context = engine.build_context(&self.query, Some(max_chars));

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "entity": self.entity,
                    "max_chars": max_chars,
                    "characters": context.chars().count(),
                    "context": context,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if context.is_empty() {
                    println!("(no context fits in {max_chars} characters)");
                } else {
                    println!("{context}");
                }
            }
        }

        Ok(())
    }
}
