//! Multi-entity coordinator
//!
//! Owns one engine per entity behind its own async mutex. All mutation of an
//! entity goes through that lock, so appends and compression for one entity
//! are serialized while different entities proceed independently. No method
//! ever holds two entity locks at once.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{AppendOutcome, MemoryEngine, TurnState};
use crate::error::{RecallError, Result};
use crate::memory::archive::ArchiveStore;
use crate::memory::types::Role;
use crate::oracle::{OracleError, ResponseOracle, SummarizationOracle, with_timeout};

pub type SharedEngine = Arc<Mutex<MemoryEngine>>;

pub struct Coordinator {
    config: Config,
    summarizer: Arc<dyn SummarizationOracle>,
    responder: Arc<dyn ResponseOracle>,
    archive: Arc<dyn ArchiveStore>,
    entities: DashMap<String, SharedEngine>,
    response_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        config: Config,
        summarizer: Arc<dyn SummarizationOracle>,
        responder: Arc<dyn ResponseOracle>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        let response_timeout = config.oracle.timeout();
        Self {
            config,
            summarizer,
            responder,
            archive,
            entities: DashMap::new(),
            response_timeout,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveStore> {
        &self.archive
    }

    /// Create an empty store for `entity`; an existing entity is kept as is
    pub fn register(&self, entity: &str, persona: &str) -> Result<SharedEngine> {
        if let Some(existing) = self.entities.get(entity) {
            return Ok(existing.clone());
        }
        let engine = MemoryEngine::new(
            entity,
            persona,
            &self.config,
            self.summarizer.clone(),
            self.archive.clone(),
        )?;
        Ok(self.insert(engine))
    }

    /// Take ownership of an already built engine, such as a restored one
    pub fn insert(&self, engine: MemoryEngine) -> SharedEngine {
        let entity = engine.entity().to_string();
        let shared = self
            .entities
            .entry(entity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(engine)))
            .clone();
        info!(entity = %entity, "Registered entity");
        shared
    }

    pub fn entity(&self, entity: &str) -> Result<SharedEngine> {
        self.entities
            .get(entity)
            .map(|e| e.clone())
            .ok_or_else(|| RecallError::UnknownEntity(entity.to_string()))
    }

    pub fn entity_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub async fn append(&self, entity: &str, content: &str, role: Role) -> Result<AppendOutcome> {
        let engine = self.entity(entity)?;
        let mut engine = engine.lock().await;
        engine.append(content, role).await
    }

    /// Deliver `message` from one entity to another and return the reply.
    ///
    /// The message is recorded in the sender's store first. The receiver
    /// then answers from its own context; only when the reply arrives are
    /// the message and the reply appended to the receiver's store, together.
    /// A failed or empty reply leaves the receiver's store untouched; an error
    /// from the receiver's compression afterwards still leaves both items in
    /// place.
    pub async fn speak(&self, from: &str, to: &str, message: &str) -> Result<String> {
        let sender = self.entity(from)?;
        let receiver = self.entity(to)?;

        {
            let mut sender = sender.lock().await;
            sender.append(message, Role::Assistant).await?;
        }

        let mut receiver = receiver.lock().await;
        receiver.set_turn_state(TurnState::MessageReceived);
        let context = receiver.build_context(message, None);
        let persona = receiver.persona().to_string();

        receiver.set_turn_state(TurnState::OracleResponsePending);
        info!(
            from,
            to,
            oracle = self.responder.name(),
            context_chars = context.chars().count(),
            "Requesting response"
        );
        let reply = with_timeout(
            self.response_timeout,
            self.responder.respond(&context, message, &persona),
        )
        .await
        .and_then(|reply| {
            let reply = reply.trim().to_string();
            if reply.is_empty() {
                Err(OracleError::Malformed("empty response".to_string()))
            } else {
                Ok(reply)
            }
        });

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!(from, to, "Response generation failed: {}", e);
                receiver.set_turn_state(TurnState::Idle);
                return Err(e.into());
            }
        };

        if let Err(e) = receiver.append_exchange(message, reply.as_str()).await {
            receiver.set_turn_state(TurnState::Idle);
            return Err(e);
        }

        receiver.set_turn_state(TurnState::ResponseAppended);
        receiver.set_turn_state(TurnState::Idle);
        Ok(reply)
    }
}
