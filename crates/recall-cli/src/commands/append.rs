use clap::Parser;
use recall_engine::memory::Role;

use crate::error::CliResult;
use crate::output::OutputFormat;
use crate::workspace::Workspace;

#[derive(Parser)]
pub struct AppendCommand {
    #[clap(help = "Entity the message belongs to")]
    pub entity: String,

    #[clap(help = "Author role (user or assistant)")]
    pub role: String,

    #[clap(help = "Message content")]
    pub content: String,

    #[clap(long, help = "Persona for a new entity (defaults to [oracle] persona)")]
    pub persona: Option<String>,
}

impl AppendCommand {
    pub async fn execute(&self, workspace: &Workspace, format: OutputFormat) -> CliResult<()> {
        let role: Role = self.role.parse()?;
        let mut engine = workspace.load_or_create(&self.entity, self.persona.as_deref())?;

        let outcome = engine.append(self.content.as_str(), role).await?;
        workspace.save(&engine)?;
        let budget = engine.store().budget();

        match format {
            OutputFormat::Json => {
                let created: Vec<_> = outcome
                    .report
                    .created
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "level": c.level,
                            "covers": c.covers,
                        })
                    })
                    .collect();
                let output = serde_json::json!({
                    "id": outcome.item.id,
                    "role": outcome.item.role,
                    "character_count": outcome.item.character_count,
                    "summaries_created": created,
                    "skipped": outcome.report.skipped.as_ref().map(|r| r.to_string()),
                    "budget_inconsistent": outcome.report.budget_inconsistent,
                    "budget": budget,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!(
                    "Appended {} ({} chars) to {}",
                    outcome.item.id, outcome.item.character_count, self.entity
                );
                for created in &outcome.report.created {
                    println!(
                        "  Created L{} summary {} covering {} items",
                        created.level,
                        created.id,
                        created.covers.len()
                    );
                }
                if let Some(reason) = &outcome.report.skipped {
                    println!("  Compression skipped ({reason}); will retry on next append");
                }
                if outcome.report.budget_inconsistent {
                    println!("  Warning: still over budget with nothing left to compress");
                }
                println!(
                    "Budget: {}/{} characters",
                    budget.current_characters, budget.max_characters
                );
            }
        }

        Ok(())
    }
}
