//! Scripted [`ChatApi`] fake shared by the engine and search tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::Notify;

use parley_shared::{
    AttachmentRef, ConversationKey, Group, GroupId, Message, Username,
};

use crate::api::{ApiError, ApiResult, ChatApi};

#[derive(Default)]
pub(crate) struct FakeApiState {
    pub contacts: Vec<Username>,
    pub groups: Vec<Group>,
    pub direct_history: HashMap<Username, Vec<Message>>,
    pub group_history: HashMap<GroupId, Vec<Message>>,
    /// Every history load the engine issued, in order.
    pub history_calls: Vec<ConversationKey>,
    /// A gated peer's next direct history call blocks until notified.
    pub direct_history_gates: HashMap<Username, Arc<Notify>>,
    /// When set, the next send is rejected with this status and body.
    pub reject_next_send: Option<(u16, String)>,
    pub sent_direct: Vec<Message>,
    pub sent_group: Vec<Message>,
    pub search_results: HashMap<String, Vec<Username>>,
    pub search_calls: Vec<String>,
    pub removed_contacts: Vec<Username>,
    pub left_groups: Vec<GroupId>,
    pub deleted_groups: Vec<GroupId>,
    pub added_members: Vec<(GroupId, Username)>,
    next_message_id: u64,
    next_group_id: u64,
}

impl FakeApiState {
    fn next_message_id(&mut self) -> u64 {
        self.next_message_id += 1;
        self.next_message_id
    }

    fn next_group_id(&mut self) -> u64 {
        self.next_group_id += 100;
        self.next_group_id
    }
}

/// In-memory [`ChatApi`] with scripted responses and call records.
#[derive(Clone, Default)]
pub(crate) struct FakeApi {
    state: Arc<Mutex<FakeApiState>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeApiState> {
        self.state.lock().unwrap()
    }
}

impl ChatApi for FakeApi {
    async fn contacts(&self, _user: &Username) -> ApiResult<Vec<Username>> {
        Ok(self.state().contacts.clone())
    }

    async fn groups(&self, _user: &Username) -> ApiResult<Vec<Group>> {
        Ok(self.state().groups.clone())
    }

    async fn direct_history(&self, _user: &Username, peer: &Username) -> ApiResult<Vec<Message>> {
        let gate = {
            let mut state = self.state();
            state
                .history_calls
                .push(ConversationKey::Direct(peer.clone()));
            state.direct_history_gates.remove(peer)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.state().direct_history.get(peer).cloned().unwrap_or_default())
    }

    async fn group_history(&self, group: GroupId) -> ApiResult<Vec<Message>> {
        let mut state = self.state();
        state.history_calls.push(ConversationKey::Group(group));
        Ok(state.group_history.get(&group).cloned().unwrap_or_default())
    }

    async fn send_direct(
        &self,
        sender: &Username,
        to: &Username,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> ApiResult<Message> {
        let mut state = self.state();
        if let Some((status, message)) = state.reject_next_send.take() {
            return Err(ApiError::Rejected { status, message });
        }
        let mut message = Message::new(
            sender.clone(),
            Some(to.clone()),
            None,
            content,
            attachment,
            Utc::now(),
        )
        .expect("fake send payload");
        message.id = Some(state.next_message_id());
        state.sent_direct.push(message.clone());
        Ok(message)
    }

    async fn send_group(
        &self,
        sender: &Username,
        group: GroupId,
        content: Option<String>,
        attachment: Option<AttachmentRef>,
    ) -> ApiResult<Message> {
        let mut state = self.state();
        if let Some((status, message)) = state.reject_next_send.take() {
            return Err(ApiError::Rejected { status, message });
        }
        let mut message = Message::new(
            sender.clone(),
            None,
            Some(group),
            content,
            attachment,
            Utc::now(),
        )
        .expect("fake send payload");
        message.id = Some(state.next_message_id());
        state.sent_group.push(message.clone());
        Ok(message)
    }

    async fn add_contact(&self, _user: &Username, _contact: &Username) -> ApiResult<()> {
        Ok(())
    }

    async fn remove_contact(&self, _user: &Username, contact: &Username) -> ApiResult<()> {
        self.state().removed_contacts.push(contact.clone());
        Ok(())
    }

    async fn create_group(&self, owner: &Username, name: &str) -> ApiResult<Group> {
        let mut state = self.state();
        let group = Group {
            id: GroupId(state.next_group_id()),
            name: name.to_string(),
            owner_username: owner.clone(),
        };
        Ok(group)
    }

    async fn add_member(&self, group: GroupId, user: &Username) -> ApiResult<()> {
        self.state().added_members.push((group, user.clone()));
        Ok(())
    }

    async fn remove_member(&self, _group: GroupId, _user: &Username) -> ApiResult<()> {
        Ok(())
    }

    async fn leave_group(&self, group: GroupId, _user: &Username) -> ApiResult<()> {
        self.state().left_groups.push(group);
        Ok(())
    }

    async fn delete_group(&self, group: GroupId, _requester: &Username) -> ApiResult<()> {
        self.state().deleted_groups.push(group);
        Ok(())
    }

    async fn search_users(&self, query: &str) -> ApiResult<Vec<Username>> {
        let mut state = self.state();
        state.search_calls.push(query.to_string());
        Ok(state.search_results.get(query).cloned().unwrap_or_default())
    }
}
