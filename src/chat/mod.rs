// Chat sessions
// Per-session conversation history with an explicit create/end lifecycle


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::RagError;
use crate::rag::RagEngine;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingInput,
    Generating,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),
    #[error("Session {0} is still generating a reply")]
    SessionBusy(Uuid),
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Session {0} is not generating a reply")]
    NotGenerating(Uuid),
}

/// One conversation. Every user turn is followed by exactly one assistant
/// turn or, when generation failed, by nothing.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    state: TurnState,
    history: Vec<ConversationTurn>,
}

impl ChatSession {
    #[inline]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: TurnState::AwaitingInput,
            history: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn state(&self) -> TurnState {
        self.state
    }

    #[inline]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Record the user's message and move to `Generating`
    #[inline]
    pub fn begin_turn(&mut self, content: &str) -> Result<(), SessionError> {
        if self.state == TurnState::Generating {
            return Err(SessionError::SessionBusy(self.id));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.history.push(ConversationTurn {
            role: Role::User,
            content: content.to_string(),
        });
        self.state = TurnState::Generating;
        Ok(())
    }

    #[inline]
    pub fn complete_turn(&mut self, reply: String) -> Result<(), SessionError> {
        self.finish_turn()?;
        self.history.push(ConversationTurn {
            role: Role::Assistant,
            content: reply,
        });
        Ok(())
    }

    /// Back to `AwaitingInput` without an assistant turn
    #[inline]
    pub fn fail_turn(&mut self) -> Result<(), SessionError> {
        self.finish_turn()
    }

    fn finish_turn(&mut self) -> Result<(), SessionError> {
        if self.state != TurnState::Generating {
            return Err(SessionError::NotGenerating(self.id));
        }
        self.state = TurnState::AwaitingInput;
        Ok(())
    }
}

impl Default for ChatSession {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Live sessions keyed by id. Sessions exist from `create` until `end`
/// and are never persisted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, ChatSession>>,
}

impl SessionStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn create(&self) -> Uuid {
        let session = ChatSession::new();
        let id = session.id();
        self.sessions.write().await.insert(id, session);
        info!("Chat session {} started", id);
        id
    }

    /// Discard the session and its history
    #[inline]
    pub async fn end(&self, id: Uuid) -> Result<(), SessionError> {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(session) => {
                info!(
                    "Chat session {} ended after {} turns",
                    id,
                    session.history().len()
                );
                Ok(())
            }
            None => Err(SessionError::NotFound(id)),
        }
    }

    #[inline]
    pub async fn get(&self, id: Uuid) -> Result<ChatSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    #[inline]
    pub async fn history(&self, id: Uuid) -> Result<Vec<ConversationTurn>, SessionError> {
        Ok(self.get(id).await?.history)
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Run one turn: append the user message, generate, and append the reply.
    /// The lock is not held while the answer is generated.
    #[inline]
    pub async fn submit(
        &self,
        id: Uuid,
        content: &str,
        engine: &RagEngine,
    ) -> Result<ConversationTurn, RagError> {
        self.with_session(id, |session| session.begin_turn(content))
            .await?;
        debug!("Session {} generating reply", id);

        let question = content.trim();
        match engine.answer(question).await {
            Ok(reply) => {
                let turn = ConversationTurn {
                    role: Role::Assistant,
                    content: reply.clone(),
                };
                self.with_session(id, |session| session.complete_turn(reply))
                    .await?;
                Ok(turn)
            }
            Err(e) => {
                warn!("Session {} turn failed: {}", id, e);
                // The session may have been ended while generating
                if let Err(end_error) = self.with_session(id, ChatSession::fail_turn).await {
                    debug!("Could not reset session {}: {}", id, end_error);
                }
                Err(e)
            }
        }
    }

    async fn with_session<F>(&self, id: Uuid, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut ChatSession) -> Result<(), SessionError>,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        f(session)
    }
}
