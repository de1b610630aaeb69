use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use recall_engine::memory::ItemId;

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_timestamp, item_kind, truncate_string};
use crate::workspace::Workspace;

#[derive(Parser)]
pub struct ArchiveCommand {
    #[clap(help = "Entity that owns the summary")]
    pub entity: String,

    #[clap(help = "Summary ID whose covered items to show")]
    pub summary_id: String,
}

impl ArchiveCommand {
    pub async fn execute(&self, workspace: &Workspace, format: OutputFormat) -> CliResult<()> {
        let engine = workspace.load(&self.entity)?;
        let summary_id = ItemId::new(self.summary_id.as_str());
        let items = engine
            .lookup_archive(&summary_id)
            .ok_or_else(|| CliError::NotArchived {
                entity: self.entity.clone(),
                summary_id: self.summary_id.clone(),
            })?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&items)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Kind", "Chars", "Created", "Content"]);

                for item in &items {
                    table.add_row([
                        item.id().as_str(),
                        &item_kind(item),
                        &item.character_count().to_string(),
                        &format_timestamp(&item.timestamp()),
                        &truncate_string(item.content(), 60),
                    ]);
                }

                println!("{table}");
                println!("\n{} items superseded by {}", items.len(), self.summary_id);
            }
        }

        Ok(())
    }
}
