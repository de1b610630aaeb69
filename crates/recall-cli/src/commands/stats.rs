use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recall_engine::memory::StoreStats;

use crate::error::CliResult;
use crate::output::OutputFormat;
use crate::workspace::Workspace;

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(help = "Show a single entity (all entities when omitted)")]
    pub entity: Option<String>,
}

impl StatsCommand {
    pub async fn execute(&self, workspace: &Workspace, format: OutputFormat) -> CliResult<()> {
        let entities = match &self.entity {
            Some(entity) => vec![entity.clone()],
            None => workspace.entities()?,
        };

        let mut rows: Vec<(String, StoreStats)> = Vec::with_capacity(entities.len());
        for entity in entities {
            let engine = workspace.load(&entity)?;
            rows.push((entity, engine.stats()));
        }

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = rows
                    .iter()
                    .map(|(entity, stats)| {
                        serde_json::json!({
                            "entity": entity,
                            "stats": stats,
                            "archive_records": workspace.archive().len(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Recall Statistics");
                println!("=================\n");

                if rows.is_empty() {
                    println!("No entities in {}", workspace.data_dir().display());
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header([
                        "Entity", "Items", "Raw", "Summaries", "L1", "Max Level", "Budget",
                    ]);

                for (entity, stats) in &rows {
                    table.add_row([
                        entity.as_str(),
                        &stats.total_items.to_string(),
                        &stats.raw_count.to_string(),
                        &stats.summary_count.to_string(),
                        &stats.l1_count.to_string(),
                        &stats.max_level.to_string(),
                        &format_budget(stats),
                    ]);
                }

                println!("{table}\n");
                println!("Archive: {} records", workspace.archive().len());
            }
        }

        Ok(())
    }
}

fn format_budget(stats: &StoreStats) -> String {
    let max = stats.budget.max_characters.max(1);
    let percent = stats.total_characters as f64 / max as f64 * 100.0;
    format!(
        "{}/{} ({:.0}%)",
        stats.total_characters, stats.budget.max_characters, percent
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_engine::memory::Budget;

    #[test]
    fn test_format_budget() {
        let stats = StoreStats {
            total_items: 2,
            raw_count: 2,
            summary_count: 0,
            l1_count: 0,
            max_level: 0,
            total_characters: 250,
            budget: Budget {
                max_characters: 1000,
                current_characters: 250,
            },
        };
        assert_eq!(format_budget(&stats), "250/1000 (25%)");
    }
}
