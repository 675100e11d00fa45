//! The synchronization engine.
//!
//! One task per session runs a single ordered loop over three sources:
//! transport session events, UI commands, and completions of collaborator
//! calls the engine spawned earlier. All state — conversation store,
//! roster, subscription registry, selection — is owned by the loop and
//! mutated only between awaits, so no handler ever observes another
//! handler mid-mutation. Completions re-check selection and roster state
//! when they land: the world may have moved while the call was in flight.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_net::{SessionEvent, SessionHandle, SubscriptionHandle};
use parley_shared::constants::{MAX_GROUP_MEMBERS, MIN_SEARCH_QUERY_LEN};
use parley_shared::topics::{self, TopicKind};
use parley_shared::{
    AttachmentRef, ConversationKey, Group, GroupId, Message, Notification, Username,
};
use parley_store::{ConversationStore, Roster};

use crate::api::{ApiResult, ChatApi};
use crate::events::{SendFailure, UiEvent};
use crate::search::{DebouncedSearch, SearchOutcome};
use crate::selection::SelectionController;
use crate::subscriptions::SubscriptionRegistry;

/// Commands from the presentation layer into the engine loop.
#[derive(Debug)]
pub enum EngineCommand {
    /// Make a conversation active (or none). Triggers a history load on
    /// first selection of a key.
    Select(Option<ConversationKey>),
    SendDirect {
        to: Username,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    },
    SendGroup {
        group: GroupId,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    },
    AddContact(Username),
    RemoveContact(Username),
    CreateGroup {
        name: String,
        members: Vec<Username>,
    },
    LeaveGroup(GroupId),
    DeleteGroup(GroupId),
    SearchUsers {
        query: String,
    },
    /// Tear the session down and end the engine task.
    Logout,
}

/// Completions of collaborator calls, posted back into the loop by the
/// tasks that ran them.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    RosterLoaded {
        result: ApiResult<(Vec<Username>, Vec<Group>)>,
    },
    HistoryLoaded {
        key: ConversationKey,
        result: ApiResult<Vec<Message>>,
    },
    DirectSendFinished {
        to: Username,
        result: ApiResult<Message>,
    },
    GroupSendFinished {
        group: GroupId,
        result: ApiResult<Message>,
    },
    ContactAddFinished {
        contact: Username,
        result: ApiResult<()>,
    },
    ContactRemoveFinished {
        contact: Username,
        result: ApiResult<()>,
    },
    GroupCreateFinished {
        result: ApiResult<Group>,
    },
    GroupLeaveFinished {
        group: GroupId,
        result: ApiResult<()>,
    },
    GroupDeleteFinished {
        group: GroupId,
        result: ApiResult<()>,
    },
}

pub(crate) struct Engine<A: ChatApi> {
    user: Username,
    api: A,
    session: SessionHandle,
    store: ConversationStore,
    roster: Roster,
    /// False until the first roster load lands; inbound frames are not
    /// checked against the roster before that.
    roster_ready: bool,
    registry: SubscriptionRegistry,
    selection: SelectionController,
    search: DebouncedSearch,
    /// History loads in flight, so a re-select never double-fires one.
    pending_loads: HashSet<ConversationKey>,
    /// Handles for the per-user base subscriptions of the current
    /// connection. Invalid after a disconnect.
    base_subscriptions: Vec<SubscriptionHandle>,
    ui_tx: mpsc::Sender<UiEvent>,
    internal_tx: mpsc::Sender<EngineEvent>,
    search_outcome_tx: mpsc::Sender<SearchOutcome>,
}

impl<A: ChatApi> Engine<A> {
    pub(crate) fn new(
        user: Username,
        api: A,
        session: SessionHandle,
        ui_tx: mpsc::Sender<UiEvent>,
        internal_tx: mpsc::Sender<EngineEvent>,
        search_outcome_tx: mpsc::Sender<SearchOutcome>,
    ) -> Self {
        Self {
            user,
            api,
            session,
            store: ConversationStore::new(),
            roster: Roster::new(),
            roster_ready: false,
            registry: SubscriptionRegistry::new(),
            selection: SelectionController::new(),
            search: DebouncedSearch::new(),
            pending_loads: HashSet::new(),
            base_subscriptions: Vec::new(),
            ui_tx,
            internal_tx,
            search_outcome_tx,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut session_events: mpsc::Receiver<SessionEvent>,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut internal: mpsc::Receiver<EngineEvent>,
        mut search_outcomes: mpsc::Receiver<SearchOutcome>,
    ) {
        info!(user = %self.user, "Engine started");
        let mut transport_alive = true;

        loop {
            tokio::select! {
                event = session_events.recv(), if transport_alive => {
                    match event {
                        Some(event) => self.on_session_event(event).await,
                        None => transport_alive = false,
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(EngineCommand::Logout) | None => {
                            info!(user = %self.user, "Logging out");
                            self.session.shutdown().await;
                            break;
                        }
                        Some(command) => self.on_command(command).await,
                    }
                }

                Some(event) = internal.recv() => self.on_internal(event).await,

                Some(outcome) = search_outcomes.recv() => self.on_search_outcome(outcome).await,
            }
        }

        info!(user = %self.user, "Engine stopped");
    }

    async fn emit(&self, event: UiEvent) {
        if self.ui_tx.send(event).await.is_err() {
            debug!("UI event receiver dropped");
        }
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                self.emit(UiEvent::ConnectionChanged { connected: true }).await;
                self.establish_base_subscriptions().await;
                self.spawn_roster_load();
            }
            SessionEvent::Frame { topic, payload } => self.on_frame(&topic, &payload).await,
            SessionEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Push channel lost");
                // Every handle died with the connection; nothing to release.
                self.registry.invalidate();
                self.base_subscriptions.clear();
                self.emit(UiEvent::ConnectionChanged { connected: false }).await;
            }
        }
    }

    /// A reconnect invalidates all prior subscriptions, so the base
    /// per-user queues are re-established on every `Connected`.
    async fn establish_base_subscriptions(&mut self) {
        let base = [
            topics::inbox(&self.user),
            topics::errors(&self.user),
            topics::notifications(&self.user),
        ];
        for topic in base {
            match self.session.subscribe(&topic).await {
                Ok(handle) => self.base_subscriptions.push(handle),
                Err(e) => warn!(topic = %topic, error = %e, "Base subscription failed"),
            }
        }
    }

    fn spawn_roster_load(&self) {
        let api = self.api.clone();
        let user = self.user.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = match api.contacts(&user).await {
                Ok(contacts) => api.groups(&user).await.map(|groups| (contacts, groups)),
                Err(e) => Err(e),
            };
            let _ = tx.send(EngineEvent::RosterLoaded { result }).await;
        });
    }

    async fn on_frame(&mut self, topic: &str, payload: &[u8]) {
        match topics::classify(topic) {
            Some(TopicKind::Inbox(user)) if user == self.user => {
                match Message::from_bytes(payload) {
                    Ok(message) => self.on_inbound_message(message).await,
                    Err(e) => warn!(error = %e, "Malformed inbound message"),
                }
            }
            Some(TopicKind::Group(_)) => match Message::from_bytes(payload) {
                Ok(message) => self.on_inbound_message(message).await,
                Err(e) => warn!(topic = %topic, error = %e, "Malformed group message"),
            },
            Some(TopicKind::Notifications(user)) if user == self.user => {
                match Notification::from_bytes(payload) {
                    Ok(notification) => self.on_notification(notification).await,
                    Err(e) => warn!(error = %e, "Malformed notification"),
                }
            }
            Some(TopicKind::Errors(user)) if user == self.user => {
                let text = String::from_utf8_lossy(payload).into_owned();
                warn!(text = %text, "Server error");
                self.emit(UiEvent::ServerError { text }).await;
            }
            _ => debug!(topic = %topic, "Frame on unexpected topic ignored"),
        }
    }

    async fn on_inbound_message(&mut self, message: Message) {
        let Some(key) = message.conversation_key(&self.user) else {
            warn!("Inbound message names neither group nor recipient");
            return;
        };

        // At-least-once delivery: absorb duplicates (including the server
        // echoing this user's own direct send back to its inbound queue).
        if let Some(id) = message.id {
            if self.store.contains_id(&key, id) {
                debug!(key = %key, id, "Duplicate delivery absorbed");
                return;
            }
        }

        if self.roster_ready && !self.key_in_roster(&key) {
            debug!(key = %key, "Message for conversation not in roster dropped");
            return;
        }

        self.deliver(key, message).await;
    }

    fn key_in_roster(&self, key: &ConversationKey) -> bool {
        match key {
            ConversationKey::Direct(peer) => self.roster.contains_contact(peer),
            ConversationKey::Group(id) => self.roster.group(*id).is_some(),
        }
    }

    /// Store unconditionally; surface only for the active conversation.
    async fn deliver(&mut self, key: ConversationKey, message: Message) {
        self.store.append(&key, message.clone());
        if self.selection.is_active(&key) {
            self.emit(UiEvent::LiveMessage { key, message }).await;
        }
    }

    // ------------------------------------------------------------------
    // Notification reconciliation
    // ------------------------------------------------------------------

    async fn on_notification(&mut self, notification: Notification) {
        match notification {
            Notification::ContactAdded { contact } => {
                if self.roster.add_contact(contact.clone()) {
                    info!(contact = %contact, "Contact added");
                    self.emit(UiEvent::ContactAdded { contact }).await;
                } else {
                    debug!(contact = %contact, "Duplicate contact-added notification");
                }
            }
            Notification::ContactRemoved { contact } => {
                self.remove_contact_locally(contact).await;
            }
            Notification::GroupCreated {
                group_id,
                group_name,
                owner,
            } => {
                self.add_group_locally(Group {
                    id: group_id,
                    name: group_name,
                    owner_username: owner,
                })
                .await;
            }
            Notification::GroupRemoved { group_id, .. } => {
                self.remove_group_locally(group_id).await;
            }
        }
    }

    async fn remove_contact_locally(&mut self, contact: Username) {
        let key = ConversationKey::Direct(contact.clone());

        // The view must fall back to "no conversation" before the roster
        // entry disappears, never after.
        if self.selection.clear_if(&key) {
            self.emit(UiEvent::ConversationClosed { key: key.clone() }).await;
        }

        if self.roster.remove_contact(&contact) {
            self.store.discard(&key);
            self.pending_loads.remove(&key);
            info!(contact = %contact, "Contact removed");
            self.emit(UiEvent::ContactRemoved { contact }).await;
        } else {
            debug!(contact = %contact, "Duplicate contact-removed notification");
        }
    }

    async fn add_group_locally(&mut self, group: Group) {
        if !self.roster.add_group(group.clone()) {
            debug!(group = %group.id, "Group already in roster");
            return;
        }
        self.reconcile_subscriptions().await;
        let created_by_me = group.owner_username == self.user;
        info!(group = %group.id, created_by_me, "Joined group");
        self.emit(UiEvent::GroupJoined { group, created_by_me }).await;
    }

    async fn remove_group_locally(&mut self, group_id: GroupId) {
        let key = ConversationKey::Group(group_id);

        if self.selection.clear_if(&key) {
            self.emit(UiEvent::ConversationClosed { key: key.clone() }).await;
        }

        if let Some(group) = self.roster.remove_group(group_id) {
            self.reconcile_subscriptions().await;
            self.store.discard(&key);
            self.pending_loads.remove(&key);
            info!(group = %group_id, "Left group");
            self.emit(UiEvent::GroupLeft {
                group_id,
                name: group.name,
            })
            .await;
        } else {
            debug!(group = %group_id, "Duplicate group-removed notification");
        }
    }

    async fn reconcile_subscriptions(&mut self) {
        let desired = self.roster.group_ids();
        if let Err(e) = self.registry.reconcile(&desired, &self.session).await {
            warn!(error = %e, "Subscription reconcile incomplete");
        }
    }

    // ------------------------------------------------------------------
    // UI commands
    // ------------------------------------------------------------------

    async fn on_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Select(None) => {
                self.selection.select(None);
            }
            EngineCommand::Select(Some(key)) => self.on_select(key).await,
            EngineCommand::SendDirect {
                to,
                content,
                attachment,
            } => self.on_send_direct(to, content, attachment).await,
            EngineCommand::SendGroup {
                group,
                content,
                attachment,
            } => self.on_send_group(group, content, attachment).await,
            EngineCommand::AddContact(contact) => {
                let api = self.api.clone();
                let user = self.user.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = api.add_contact(&user, &contact).await;
                    let _ = tx
                        .send(EngineEvent::ContactAddFinished { contact, result })
                        .await;
                });
            }
            EngineCommand::RemoveContact(contact) => {
                let api = self.api.clone();
                let user = self.user.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = api.remove_contact(&user, &contact).await;
                    let _ = tx
                        .send(EngineEvent::ContactRemoveFinished { contact, result })
                        .await;
                });
            }
            EngineCommand::CreateGroup { name, members } => {
                self.on_create_group(name, members).await;
            }
            EngineCommand::LeaveGroup(group) => {
                let api = self.api.clone();
                let user = self.user.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = api.leave_group(group, &user).await;
                    let _ = tx
                        .send(EngineEvent::GroupLeaveFinished { group, result })
                        .await;
                });
            }
            EngineCommand::DeleteGroup(group) => {
                let api = self.api.clone();
                let user = self.user.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = api.delete_group(group, &user).await;
                    let _ = tx
                        .send(EngineEvent::GroupDeleteFinished { group, result })
                        .await;
                });
            }
            EngineCommand::SearchUsers { query } => self.on_search(query).await,
            EngineCommand::Logout => unreachable!("handled by the run loop"),
        }
    }

    async fn on_select(&mut self, key: ConversationKey) {
        self.selection.select(Some(key.clone()));

        if self.store.is_loaded(&key) {
            let messages = self.store.get(&key).to_vec();
            self.emit(UiEvent::ConversationLoaded { key, messages }).await;
        } else if self.pending_loads.insert(key.clone()) {
            self.spawn_history_load(key);
        }
        // Otherwise a load is already in flight and will surface when it
        // lands, if this key is still the active one.
    }

    fn spawn_history_load(&self, key: ConversationKey) {
        let api = self.api.clone();
        let user = self.user.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = match &key {
                ConversationKey::Direct(peer) => api.direct_history(&user, peer).await,
                ConversationKey::Group(id) => api.group_history(*id).await,
            };
            let _ = tx.send(EngineEvent::HistoryLoaded { key, result }).await;
        });
    }

    fn validate_send(
        &self,
        content: &Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> Option<SendFailure> {
        let has_content = content.as_deref().is_some_and(|c| !c.trim().is_empty());
        if !has_content && attachment.is_none() {
            return Some(SendFailure::Rejected {
                message: "Message must have either text content or an attachment".to_string(),
            });
        }
        None
    }

    async fn on_send_direct(
        &mut self,
        to: Username,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) {
        let key = ConversationKey::Direct(to.clone());
        if let Some(reason) = self.validate_send(&content, attachment) {
            self.emit(UiEvent::SendFailed { key, reason }).await;
            return;
        }
        if !self.session.is_connected() {
            self.emit(UiEvent::SendFailed {
                key,
                reason: SendFailure::Connectivity,
            })
            .await;
            return;
        }

        let api = self.api.clone();
        let user = self.user.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.send_direct(&user, &to, content, attachment).await;
            let _ = tx
                .send(EngineEvent::DirectSendFinished { to, result })
                .await;
        });
    }

    async fn on_send_group(
        &mut self,
        group: GroupId,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) {
        let key = ConversationKey::Group(group);
        if let Some(reason) = self.validate_send(&content, attachment) {
            self.emit(UiEvent::SendFailed { key, reason }).await;
            return;
        }
        if !self.session.is_connected() {
            self.emit(UiEvent::SendFailed {
                key,
                reason: SendFailure::Connectivity,
            })
            .await;
            return;
        }

        let api = self.api.clone();
        let user = self.user.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.send_group(&user, group, content, attachment).await;
            let _ = tx
                .send(EngineEvent::GroupSendFinished { group, result })
                .await;
        });
    }

    async fn on_create_group(&mut self, name: String, members: Vec<Username>) {
        if members.len() + 1 > MAX_GROUP_MEMBERS {
            self.emit(UiEvent::ActionFailed {
                action: "create group",
                message: format!("A group cannot have more than {MAX_GROUP_MEMBERS} members"),
            })
            .await;
            return;
        }

        let api = self.api.clone();
        let user = self.user.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let group = api.create_group(&user, &name).await?;
                for member in &members {
                    api.add_member(group.id, member).await?;
                }
                Ok(group)
            }
            .await;
            let _ = tx.send(EngineEvent::GroupCreateFinished { result }).await;
        });
    }

    async fn on_search(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.len() < MIN_SEARCH_QUERY_LEN {
            self.emit(UiEvent::SearchResults {
                query,
                users: Vec::new(),
            })
            .await;
            return;
        }
        self.search
            .schedule(self.api.clone(), query, self.search_outcome_tx.clone());
    }

    async fn on_search_outcome(&mut self, outcome: SearchOutcome) {
        if !self.search.is_current(outcome.generation) {
            debug!(generation = outcome.generation, "Stale search result dropped");
            return;
        }
        match outcome.result {
            Ok(mut users) => {
                // The searcher and existing contacts are never offered.
                users.retain(|u| *u != self.user && !self.roster.contains_contact(u));
                self.emit(UiEvent::SearchResults {
                    query: outcome.query,
                    users,
                })
                .await;
            }
            Err(e) => {
                self.emit(UiEvent::ActionFailed {
                    action: "search users",
                    message: e.user_message(),
                })
                .await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Collaborator call completions
    // ------------------------------------------------------------------

    async fn on_internal(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::RosterLoaded { result } => match result {
                Ok((contacts, groups)) => {
                    self.roster.replace(contacts, groups);
                    self.roster_ready = true;
                    self.reconcile_subscriptions().await;
                    self.emit(UiEvent::Ready {
                        contacts: self.roster.contacts(),
                        groups: self.roster.groups(),
                    })
                    .await;
                }
                Err(e) => {
                    self.emit(UiEvent::ActionFailed {
                        action: "load roster",
                        message: e.user_message(),
                    })
                    .await;
                }
            },

            EngineEvent::HistoryLoaded { key, result } => {
                self.pending_loads.remove(&key);
                match result {
                    Ok(messages) => {
                        // The conversation may have been removed while the
                        // load was in flight.
                        if self.roster_ready && !self.key_in_roster(&key) {
                            debug!(key = %key, "History for removed conversation dropped");
                            return;
                        }
                        self.store.install_history(&key, messages);
                        // Stale-selection rule: always stored, surfaced
                        // only if this key is still the active one.
                        if self.selection.is_active(&key) {
                            self.emit(UiEvent::ConversationLoaded {
                                key: key.clone(),
                                messages: self.store.get(&key).to_vec(),
                            })
                            .await;
                        }
                    }
                    Err(e) => {
                        self.emit(UiEvent::ActionFailed {
                            action: "load history",
                            message: e.user_message(),
                        })
                        .await;
                    }
                }
            }

            EngineEvent::DirectSendFinished { to, result } => match result {
                Ok(message) => {
                    let key = ConversationKey::Direct(to.clone());
                    if self.roster_ready && !self.roster.contains_contact(&to) {
                        debug!(contact = %to, "Send acknowledged for removed contact dropped");
                        return;
                    }
                    // Append-on-send: the dispatcher is the sole writer
                    // for the sender's copy of a direct message.
                    self.deliver(key, message).await;
                }
                Err(e) => {
                    self.emit(UiEvent::SendFailed {
                        key: ConversationKey::Direct(to),
                        reason: SendFailure::Rejected {
                            message: e.user_message(),
                        },
                    })
                    .await;
                }
            },

            EngineEvent::GroupSendFinished { group, result } => match result {
                Ok(_) => {
                    // Append-on-broadcast-only: the sender's own group
                    // subscription delivers the canonical copy exactly
                    // once through the inbound path. Appending here as
                    // well would show the message twice.
                    debug!(group = %group, "Group send acknowledged");
                }
                Err(e) => {
                    self.emit(UiEvent::SendFailed {
                        key: ConversationKey::Group(group),
                        reason: SendFailure::Rejected {
                            message: e.user_message(),
                        },
                    })
                    .await;
                }
            },

            EngineEvent::ContactAddFinished { contact, result } => match result {
                Ok(()) => {
                    // The notification queue echoes this change; whichever
                    // lands first wins, the other is absorbed.
                    if self.roster.add_contact(contact.clone()) {
                        self.emit(UiEvent::ContactAdded { contact }).await;
                    }
                }
                Err(e) => {
                    self.emit(UiEvent::ActionFailed {
                        action: "add contact",
                        message: e.user_message(),
                    })
                    .await;
                }
            },

            EngineEvent::ContactRemoveFinished { contact, result } => match result {
                Ok(()) => self.remove_contact_locally(contact).await,
                Err(e) => {
                    self.emit(UiEvent::ActionFailed {
                        action: "remove contact",
                        message: e.user_message(),
                    })
                    .await;
                }
            },

            EngineEvent::GroupCreateFinished { result } => match result {
                Ok(group) => self.add_group_locally(group).await,
                Err(e) => {
                    self.emit(UiEvent::ActionFailed {
                        action: "create group",
                        message: e.user_message(),
                    })
                    .await;
                }
            },

            EngineEvent::GroupLeaveFinished { group, result } => match result {
                Ok(()) => self.remove_group_locally(group).await,
                Err(e) => {
                    self.emit(UiEvent::ActionFailed {
                        action: "leave group",
                        message: e.user_message(),
                    })
                    .await;
                }
            },

            EngineEvent::GroupDeleteFinished { group, result } => match result {
                Ok(()) => self.remove_group_locally(group).await,
                Err(e) => {
                    self.emit(UiEvent::ActionFailed {
                        action: "delete group",
                        message: e.user_message(),
                    })
                    .await;
                }
            },
        }
    }
}
