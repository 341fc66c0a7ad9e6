use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use uuid::Uuid;

use crate::domains::resolver::MessageTargetResolver;
use crate::domains::selection::{SelectionReconciler, SessionCard};
use crate::domains::sessions::entity::SelectionState;
use crate::domains::sessions::{PersistBridge, SessionStore};
use crate::errors::StellwerkError;
use crate::events::{
    EventEmitter, RouteResultPayload, SelectionChangedPayload, StellwerkEvent, ToastKind,
    emit_json,
};
use crate::infrastructure::events::{
    CommandReceiver, CommandSender, EngineCommand, RouteRequest, command_channel,
    command_for_window_event,
};
use crate::infrastructure::query::{DEFAULT_REFRESH_INTERVAL, QueryCache};
use crate::shared::SessionStoreGateway;

/// Wires the reactive store, immediate-persist bridge, query cache,
/// selection reconciler, and resolver together, and processes engine
/// commands in arrival order on one logical thread. List refreshes and
/// navigation flow through the same queue, so a new card list is always
/// applied before a navigation event that raced it.
#[derive(Clone)]
pub struct SyncEngine {
    store: SessionStore,
    cache: Arc<QueryCache>,
    gateway: Arc<dyn SessionStoreGateway>,
    emitter: Arc<dyn EventEmitter>,
    reconciler: Arc<SelectionReconciler>,
    resolver: Arc<MessageTargetResolver>,
    sender: CommandSender,
}

impl SyncEngine {
    pub fn new(
        gateway: Arc<dyn SessionStoreGateway>,
        emitter: Arc<dyn EventEmitter>,
    ) -> (Self, CommandReceiver) {
        let store = SessionStore::new();
        let cache = QueryCache::new(gateway.clone(), DEFAULT_REFRESH_INTERVAL);
        let bridge = PersistBridge::new(gateway.clone());
        bridge.install(&store);
        let reconciler = Arc::new(SelectionReconciler::new(store.clone()));
        let resolver = Arc::new(MessageTargetResolver::new(
            store.clone(),
            cache.clone(),
            gateway.clone(),
        ));
        let (sender, receiver) = command_channel();
        (
            Self {
                store,
                cache,
                gateway,
                emitter,
                reconciler,
                resolver,
                sender,
            },
            receiver,
        )
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn handle(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn selection(&self, worktree_id: &str) -> SelectionState {
        self.store.selection(worktree_id)
    }

    pub fn active_worktree(&self) -> Option<String> {
        self.store.active_worktree()
    }

    /// Consume-once auto-open flag, set when a session was just created for
    /// a worktree and the UI should open it on next render.
    pub fn take_auto_open(&self, worktree_id: &str) -> bool {
        self.store.take_auto_open(worktree_id)
    }

    /// Entry point for named cross-window events.
    pub fn handle_window_event(&self, name: &str, payload: &serde_json::Value) {
        let active = self.store.active_worktree();
        if let Some(command) = command_for_window_event(name, payload, active.as_deref())
            && self.sender.send(command).is_err()
        {
            warn!("Engine command loop is gone; dropping window event '{name}'");
        }
    }

    /// Processes commands until the channel closes.
    pub async fn run(&self, mut receiver: CommandReceiver) {
        while let Some(command) = receiver.recv().await {
            self.handle_command(command).await;
        }
    }

    async fn handle_command(&self, command: EngineCommand) {
        match command {
            EngineCommand::SelectSession {
                worktree_id,
                session_id,
            } => {
                if self.reconciler.select(&worktree_id, &session_id) {
                    self.emit_selection(&worktree_id);
                } else {
                    warn!(
                        "Ignoring selection of session '{session_id}': not in the current list for worktree '{worktree_id}'"
                    );
                }
            }
            EngineCommand::Navigate {
                worktree_id,
                direction,
            } => {
                if self.reconciler.navigate(&worktree_id, direction).is_some() {
                    self.emit_selection(&worktree_id);
                }
            }
            EngineCommand::OpenSessionModal { session_id } => {
                let Some(worktree_id) = self.store.worktree_for_session(&session_id) else {
                    warn!(
                        "Cannot open session modal: {}",
                        StellwerkError::SessionNotFound {
                            session_id: session_id.clone()
                        }
                    );
                    return;
                };
                if self.reconciler.select(&worktree_id, &session_id) {
                    self.store.set_overlay_open(&worktree_id, true);
                    self.emit_selection(&worktree_id);
                } else {
                    warn!(
                        "Cannot open session modal for '{session_id}': not in the current list for worktree '{worktree_id}'"
                    );
                }
            }
            EngineCommand::CreateSession { worktree_id } => {
                self.create_session(&worktree_id).await;
            }
            EngineCommand::ArchiveSession { session_id } => {
                self.archive_session(&session_id).await;
            }
            EngineCommand::SessionsRefreshed { worktree_id } => {
                self.refresh_worktree(&worktree_id).await;
            }
            EngineCommand::RouteAutomatedMessage { request } => {
                // Resolution may hang on an unresponsive remote store; it
                // must not stall command processing for the rest of the UI.
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.route_automated_message(request).await;
                });
            }
        }
    }

    async fn create_session(&self, worktree_id: &str) {
        let Some(path) = self.store.worktree_path(worktree_id) else {
            warn!(
                "Cannot create session: {}",
                StellwerkError::WorktreeNotFound {
                    worktree_id: worktree_id.to_string()
                }
            );
            return;
        };
        match self.gateway.create_session(worktree_id, &path).await {
            Ok(session) => {
                self.cache.invalidate_sessions(worktree_id);
                self.store.register_session_worktree(&session.id, worktree_id);
                self.store.request_auto_open(worktree_id);
                self.refresh_worktree(worktree_id).await;
            }
            Err(err) => {
                warn!("Session creation failed for worktree '{worktree_id}': {err}");
                let error = StellwerkError::creation("session", err);
                if emit_json(
                    self.emitter.as_ref(),
                    StellwerkEvent::SessionCreateFailed,
                    &error,
                )
                .is_err()
                {
                    warn!("Failed to emit session-create-failed event");
                }
            }
        }
    }

    async fn archive_session(&self, session_id: &str) {
        let Some(worktree_id) = self.store.worktree_for_session(session_id) else {
            warn!("Cannot archive session '{session_id}': owning worktree unknown");
            return;
        };
        let Some(path) = self.store.worktree_path(&worktree_id) else {
            warn!(
                "Cannot archive session '{session_id}': no path registered for worktree '{worktree_id}'"
            );
            return;
        };
        if let Err(err) = self
            .gateway
            .archive_session(&worktree_id, &path, session_id)
            .await
        {
            warn!("Archiving session '{session_id}' failed: {err}");
            return;
        }
        self.store.forget_session(session_id);
        self.cache.invalidate_sessions(&worktree_id);
        self.refresh_worktree(&worktree_id).await;
    }

    /// Refetches the session list for a tracked worktree and reconciles the
    /// selection against it. Background failures are logged, never surfaced.
    async fn refresh_worktree(&self, worktree_id: &str) {
        let sessions = match self.cache.refresh_sessions(worktree_id).await {
            Ok(Some(sessions)) => sessions,
            Ok(None) => return,
            Err(err) => {
                warn!("Session refresh for worktree '{worktree_id}' failed: {err}");
                return;
            }
        };

        let mut cards = Vec::new();
        for session in &sessions {
            if session.is_archived() {
                // An archived session stops being tracked; dropping its
                // transient entries is itself a persistable transition.
                self.store.forget_session(&session.id);
            } else {
                self.store.register_session_worktree(&session.id, worktree_id);
                cards.push(SessionCard::from_session(session));
            }
        }

        let path = self.store.worktree_path(worktree_id);
        self.reconciler
            .reconcile(worktree_id, path.as_deref(), cards);

        if emit_json(
            self.emitter.as_ref(),
            StellwerkEvent::SessionsRefreshed,
            &serde_json::json!({ "worktreeId": worktree_id }),
        )
        .is_err()
        {
            warn!("Failed to emit sessions-refreshed event");
        }
    }

    /// Resolves an automation request to a session and routes the message
    /// into it. Success and failure are reported at toast level; in-flight
    /// work is not cancelled by later UI navigation.
    pub async fn route_automated_message(&self, request: RouteRequest) {
        let request_id = Uuid::new_v4().to_string();
        let target = match self
            .resolver
            .resolve(&request.branch, &request.project_path)
            .await
        {
            Ok(target) => target,
            Err(err) => {
                warn!("Automated message resolution failed: {err}");
                self.emit_route_result(&request_id, ToastKind::Error, err.to_string(), None);
                return;
            }
        };

        if let Err(err) = self.gateway.send_message(&target, &request.message).await {
            let error = StellwerkError::RoutingFailed {
                session_id: target.session_id.clone(),
                message: err.to_string(),
            };
            warn!("{error}");
            self.emit_route_result(
                &request_id,
                ToastKind::Error,
                error.to_string(),
                Some(target.session_id),
            );
            return;
        }

        info!(
            "Routed automated message for branch '{}' to session '{}'",
            request.branch, target.session_id
        );
        self.store.set_active_worktree(&target.worktree_id);
        self.store
            .register_worktree_path(&target.worktree_id, target.worktree_path.clone());
        if let Some(project_id) = &target.project_id
            && emit_json(
                self.emitter.as_ref(),
                StellwerkEvent::ProjectExpanded,
                &serde_json::json!({ "projectId": project_id }),
            )
            .is_err()
        {
            warn!("Failed to emit project-expanded event");
        }
        self.refresh_worktree(&target.worktree_id).await;
        self.emit_route_result(
            &request_id,
            ToastKind::Success,
            format!("Message routed to session '{}'", target.session_id),
            Some(target.session_id),
        );
    }

    /// Polls tracked worktrees on a fixed interval, pushing refreshes
    /// through the command queue so they serialize with navigation.
    pub fn start_background_refresh(&self, interval: Duration) {
        let cache = self.cache.clone();
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                for (worktree_id, _path) in cache.tracked_session_worktrees() {
                    if sender
                        .send(EngineCommand::SessionsRefreshed { worktree_id })
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    fn emit_selection(&self, worktree_id: &str) {
        let selection = self.store.selection(worktree_id);
        let payload = SelectionChangedPayload {
            worktree_id: worktree_id.to_string(),
            session_id: selection.session_id,
            index: selection.index,
        };
        if emit_json(self.emitter.as_ref(), StellwerkEvent::SelectionChanged, &payload).is_err() {
            warn!("Failed to emit selection-changed event");
        }
    }

    fn emit_route_result(
        &self,
        request_id: &str,
        kind: ToastKind,
        message: String,
        session_id: Option<String>,
    ) {
        let payload = RouteResultPayload {
            request_id: request_id.to_string(),
            kind,
            message,
            session_id,
        };
        let event = match payload.kind {
            ToastKind::Success => StellwerkEvent::RouteSucceeded,
            ToastKind::Error => StellwerkEvent::RouteFailed,
        };
        if emit_json(self.emitter.as_ref(), event, &payload).is_err() {
            warn!("Failed to emit route result event");
        }
    }
}
