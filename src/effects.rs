//! Effect coordinator: runs remote calls for requests and turns their results
//! into store-update commands.
//!
//! Every request is handled by exactly one handler making exactly one remote
//! call. Handlers run as independent tasks with no ordering between them.
//! Store commands are applied in the order handlers emit them, so two fetches
//! may land in completion order rather than issue order. A
//! [`CancellationToken`] ties a request to the lifetime of whoever issued it;
//! once cancelled, a late completion is dropped instead of applied.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::api::client::RemoteApi;
use crate::api::models::{
    ClientDetail, ClientUpdate, Conversation, ConversationPatch, ConversationRef, Filters, InboxEntry, NoteRef,
    NoteRequest, RemapRequest, SelectedClientPatch, StatusChange,
};
use crate::error::{ApiError, Failure, FailureKind, InboxError};
use crate::store::{Command, Store};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    FetchConversations { project_id: String, filters: Filters },
    ChangeStatus(StatusChange),
    UpdateClient(ClientUpdate),
    AddToInbox(InboxEntry),
    FetchClientDetail { project_id: String, client_id: String },
    AddNote(NoteRequest),
    DeleteNote(NoteRef),
    DeleteConversation(ConversationRef),
    RemapDialogs(RemapRequest),
}

impl Request {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Request::FetchConversations { .. } | Request::FetchClientDetail { .. } => FailureKind::FetchFailed,
            Request::ChangeStatus(_) => FailureKind::AssignmentFailed,
            Request::UpdateClient(_) | Request::AddToInbox(_) => FailureKind::WriteFailed,
            Request::AddNote(_) | Request::DeleteNote(_) => FailureKind::NoteOperationFailed,
            Request::DeleteConversation(_) => FailureKind::DeleteFailed,
            Request::RemapDialogs(_) => FailureKind::RemapFailed,
        }
    }
}

/// What a successful request resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Conversations(Vec<Conversation>),
    ClientDetail(ClientDetail),
    Done,
}

impl Outcome {
    pub fn into_conversations(self) -> Result<Vec<Conversation>, InboxError> {
        match self {
            Outcome::Conversations(list) => Ok(list),
            other => Err(InboxError::UnexpectedOutcome(format!("{other:?}"))),
        }
    }

    pub fn into_client_detail(self) -> Result<ClientDetail, InboxError> {
        match self {
            Outcome::ClientDetail(detail) => Ok(detail),
            other => Err(InboxError::UnexpectedOutcome(format!("{other:?}"))),
        }
    }
}

/// Future result of a dispatched request.
pub struct Pending {
    rx: oneshot::Receiver<Result<Outcome, InboxError>>,
}

impl Pending {
    pub async fn wait(self) -> Result<Outcome, InboxError> {
        self.rx.await.unwrap_or(Err(InboxError::CoordinatorGone))
    }
}

#[derive(Clone)]
pub struct Coordinator {
    api: Arc<dyn RemoteApi>,
    store: Store,
}

impl Coordinator {
    pub fn new(api: Arc<dyn RemoteApi>, store: Store) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Spawns the request as its own task.
    pub fn dispatch(&self, request: Request) -> Pending {
        self.dispatch_with(request, CancellationToken::new())
    }

    /// Spawns the request; cancelling `token` drops its result.
    pub fn dispatch_with(&self, request: Request, token: CancellationToken) -> Pending {
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.handle(request, &token).await;
            let _ = tx.send(result);
        });
        Pending { rx }
    }

    /// Runs the request in the calling task.
    pub async fn handle(&self, request: Request, token: &CancellationToken) -> Result<Outcome, InboxError> {
        let kind = request.failure_kind();
        log::debug!("handling {request:?}");
        match request {
            Request::FetchConversations { project_id, filters } => {
                self.store.dispatch(Command::SetFetchingIncomingMessages(true));
                let result = self.call(kind, token, self.api.fetch_incoming_messages(&project_id, &filters)).await;
                match result {
                    Ok(conversations) => {
                        log::info!("fetched {} conversations for project {}", conversations.len(), project_id);
                        self.store.dispatch_all([
                            Command::SetConversations(conversations.clone()),
                            Command::SetFetchingIncomingMessages(false),
                        ]);
                        Ok(Outcome::Conversations(conversations))
                    }
                    Err(err) => {
                        self.store.dispatch(Command::SetFetchingIncomingMessages(false));
                        Err(err)
                    }
                }
            }
            Request::ChangeStatus(change) => {
                self.call(kind, token, self.api.update_messages_status(&change)).await?;
                self.store.dispatch_all([
                    Command::UpdateConversation {
                        client_id: change.client_id.clone(),
                        patch: ConversationPatch {
                            messages_status: Some(change.messages_status),
                            assigned_to: change.assigned_to.clone(),
                            ..ConversationPatch::default()
                        },
                    },
                    Command::UpdateSelectedClient {
                        client_id: change.client_id,
                        patch: SelectedClientPatch {
                            messages_status: Some(change.messages_status),
                            assigned_to: change.assigned_to,
                            ..SelectedClientPatch::default()
                        },
                        at: crate::utils::now_millis(),
                    },
                ]);
                Ok(Outcome::Done)
            }
            Request::UpdateClient(update) => {
                self.call(kind, token, self.api.update_selected_client(&update)).await?;
                Ok(Outcome::Done)
            }
            Request::AddToInbox(entry) => {
                self.call(kind, token, self.api.add_message_to_inbox(&entry)).await?;
                Ok(Outcome::Done)
            }
            Request::FetchClientDetail { project_id, client_id } => {
                self.store.dispatch(Command::SetFetchingSelectedClientInfo(true));
                let result = self
                    .call(kind, token, self.api.get_selected_client_info(&project_id, &client_id))
                    .await;
                self.store.dispatch(Command::SetFetchingSelectedClientInfo(false));
                result.map(Outcome::ClientDetail)
            }
            Request::AddNote(request) => {
                self.call(kind, token, self.api.add_note(&request)).await?;
                Ok(Outcome::Done)
            }
            Request::DeleteNote(note) => {
                self.call(kind, token, self.api.delete_note(&note)).await?;
                Ok(Outcome::Done)
            }
            Request::DeleteConversation(conversation) => {
                self.call(kind, token, self.api.delete_client_appeal(&conversation)).await?;
                Ok(Outcome::Done)
            }
            Request::RemapDialogs(request) => {
                self.call(kind, token, self.api.remap_dialogs_to_teammate(&request)).await?;
                Ok(Outcome::Done)
            }
        }
    }

    /// Awaits one remote call, racing it against `token`. Remote errors are
    /// recorded in the store as a typed failure.
    async fn call<T>(
        &self,
        kind: FailureKind,
        token: &CancellationToken,
        fut: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, InboxError> {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(InboxError::Cancelled),
            result = fut => result,
        };
        if token.is_cancelled() {
            return Err(InboxError::Cancelled);
        }
        result.map_err(|err| {
            let failure = Failure::new(kind, err.to_string());
            log::warn!("{failure}");
            self.store.dispatch(Command::RecordFailure(failure.clone()));
            InboxError::Failed(failure)
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory [`RemoteApi`] shared by the crate's tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;

    #[derive(Default)]
    pub struct FakeApi {
        pub conversations: Mutex<Vec<Conversation>>,
        pub detail: Mutex<ClientDetail>,
        /// Error statuses handed out to the next calls, oldest first.
        pub failures: Mutex<VecDeque<u16>>,
        /// When set, every call waits for a permit before answering.
        pub gate: Option<Arc<Semaphore>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        pub fn gated(gate: Arc<Semaphore>) -> Self {
            Self { gate: Some(gate), ..Self::default() }
        }

        pub fn fail_next(&self, status: u16) {
            self.failures.lock().unwrap().push_back(status);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn enter(&self, name: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(name.to_string());
            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            match self.failures.lock().unwrap().pop_front() {
                Some(status) => Err(ApiError::Status(status)),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for FakeApi {
        async fn fetch_incoming_messages(&self, _: &str, _: &Filters) -> Result<Vec<Conversation>, ApiError> {
            self.enter("fetch_incoming_messages").await?;
            Ok(self.conversations.lock().unwrap().clone())
        }
        async fn update_messages_status(&self, _: &StatusChange) -> Result<(), ApiError> {
            self.enter("update_messages_status").await
        }
        async fn update_selected_client(&self, _: &ClientUpdate) -> Result<(), ApiError> {
            self.enter("update_selected_client").await
        }
        async fn add_message_to_inbox(&self, _: &InboxEntry) -> Result<(), ApiError> {
            self.enter("add_message_to_inbox").await
        }
        async fn get_selected_client_info(&self, _: &str, _: &str) -> Result<ClientDetail, ApiError> {
            self.enter("get_selected_client_info").await?;
            Ok(self.detail.lock().unwrap().clone())
        }
        async fn add_note(&self, _: &NoteRequest) -> Result<(), ApiError> {
            self.enter("add_note").await
        }
        async fn delete_note(&self, _: &NoteRef) -> Result<(), ApiError> {
            self.enter("delete_note").await
        }
        async fn delete_client_appeal(&self, _: &ConversationRef) -> Result<(), ApiError> {
            self.enter("delete_client_appeal").await
        }
        async fn remap_dialogs_to_teammate(&self, _: &RemapRequest) -> Result<(), ApiError> {
            self.enter("remap_dialogs_to_teammate").await
        }
    }
}
