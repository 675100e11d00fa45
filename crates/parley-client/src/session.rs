//! Client session lifecycle.
//!
//! One [`ClientSession`] per logged-in user per process. `login` wires the
//! transport session task to the engine loop and hands back the command
//! handle plus the [`UiEvent`] stream; `logout` tears both down. No other
//! component reaches into the engine's state — everything goes through
//! the command channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use parley_net::{spawn_session, PushLink, SessionConfig};
use parley_shared::constants::{COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY};
use parley_shared::{AttachmentRef, ConversationKey, GroupId, Username};

use crate::api::ChatApi;
use crate::engine::{Engine, EngineCommand};
use crate::error::ClientError;
use crate::events::UiEvent;

/// Cloneable command handle into a running engine.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl ClientHandle {
    async fn command(&self, command: EngineCommand) -> Result<(), ClientError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Select the active conversation, or none.
    pub async fn select(&self, key: Option<ConversationKey>) -> Result<(), ClientError> {
        self.command(EngineCommand::Select(key)).await
    }

    pub async fn send_direct(
        &self,
        to: Username,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> Result<(), ClientError> {
        self.command(EngineCommand::SendDirect {
            to,
            content,
            attachment,
        })
        .await
    }

    pub async fn send_group(
        &self,
        group: GroupId,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> Result<(), ClientError> {
        self.command(EngineCommand::SendGroup {
            group,
            content,
            attachment,
        })
        .await
    }

    pub async fn add_contact(&self, contact: Username) -> Result<(), ClientError> {
        self.command(EngineCommand::AddContact(contact)).await
    }

    pub async fn remove_contact(&self, contact: Username) -> Result<(), ClientError> {
        self.command(EngineCommand::RemoveContact(contact)).await
    }

    pub async fn create_group(
        &self,
        name: impl Into<String>,
        members: Vec<Username>,
    ) -> Result<(), ClientError> {
        self.command(EngineCommand::CreateGroup {
            name: name.into(),
            members,
        })
        .await
    }

    pub async fn leave_group(&self, group: GroupId) -> Result<(), ClientError> {
        self.command(EngineCommand::LeaveGroup(group)).await
    }

    pub async fn delete_group(&self, group: GroupId) -> Result<(), ClientError> {
        self.command(EngineCommand::DeleteGroup(group)).await
    }

    pub async fn search_users(&self, query: impl Into<String>) -> Result<(), ClientError> {
        self.command(EngineCommand::SearchUsers {
            query: query.into(),
        })
        .await
    }
}

/// A logged-in session owning the transport and engine tasks.
pub struct ClientSession {
    user: Username,
    handle: ClientHandle,
    engine: JoinHandle<()>,
}

impl ClientSession {
    /// Connect the push channel and start the engine for `user`.
    ///
    /// Returns the session and the ordered [`UiEvent`] stream. The first
    /// events are `ConnectionChanged { connected: true }` followed by
    /// `Ready` once the roster has loaded.
    pub fn login<A: ChatApi, L: PushLink>(
        user: Username,
        api: A,
        link: L,
    ) -> (Self, mpsc::Receiver<UiEvent>) {
        let (session_handle, session_events) = spawn_session(link, SessionConfig::default());

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (ui_tx, ui_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (search_tx, search_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Engine::new(
            user.clone(),
            api,
            session_handle,
            ui_tx,
            internal_tx,
            search_tx,
        );
        let task = tokio::spawn(engine.run(session_events, cmd_rx, internal_rx, search_rx));

        info!(user = %user, "Client session started");
        (
            Self {
                user,
                handle: ClientHandle { cmd_tx },
                engine: task,
            },
            ui_rx,
        )
    }

    pub fn user(&self) -> &Username {
        &self.user
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Disconnect and wait for the engine to wind down.
    pub async fn logout(self) {
        let _ = self.handle.cmd_tx.send(EngineCommand::Logout).await;
        let _ = self.engine.await;
        info!(user = %self.user, "Client session ended");
    }
}
