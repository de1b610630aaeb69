use clap::Parser;
use recall_engine::coordinator::Coordinator;
use recall_engine::oracle;

use crate::error::CliResult;
use crate::output::OutputFormat;
use crate::workspace::Workspace;

#[derive(Parser)]
pub struct SpeakCommand {
    #[clap(help = "Entity sending the message")]
    pub from: String,

    #[clap(help = "Entity answering the message")]
    pub to: String,

    #[clap(help = "Message text")]
    pub message: String,
}

impl SpeakCommand {
    pub async fn execute(&self, workspace: &Workspace, format: OutputFormat) -> CliResult<()> {
        if self.from == self.to {
            return Err("An entity cannot speak to itself".into());
        }
        let responder = oracle::build_responder(&workspace.config().oracle)?;
        let coordinator = Coordinator::new(
            workspace.config().clone(),
            workspace.summarizer().clone(),
            responder,
            workspace.archive().clone(),
        );
        for entity in [&self.from, &self.to] {
            coordinator.insert(workspace.load_or_create(entity, None)?);
        }

        let result = coordinator.speak(&self.from, &self.to, &self.message).await;

        // the sender's message is kept even when the reply fails
        for entity in [&self.from, &self.to] {
            let engine = coordinator.entity(entity)?;
            workspace.save(&*engine.lock().await)?;
        }
        let reply = result?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "from": self.from,
                    "to": self.to,
                    "message": self.message,
                    "reply": reply,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("{}: {}", self.from, self.message);
                println!("{}: {}", self.to, reply);
            }
        }

        Ok(())
    }
}
