use eventide_core::{CommandId, EntityId, Metadata};

/// Context handed to every command handler.
///
/// Commands represent **intent**; the context describes *who* is being addressed and
/// *how*: the target identity, a unique id for this submission and the caller's metadata.
/// Handlers use the metadata for conditional logic; the entity core copies it onto every
/// event the command emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    command_id: CommandId,
    entity_id: EntityId,
    metadata: Metadata,
}

impl CommandContext {
    pub fn new(entity_id: EntityId, metadata: Metadata) -> Self {
        Self {
            command_id: CommandId::new(),
            entity_id,
            metadata,
        }
    }

    pub fn with_command_id(mut self, command_id: CommandId) -> Self {
        self.command_id = command_id;
        self
    }

    pub fn command_id(&self) -> CommandId {
        self.command_id
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
