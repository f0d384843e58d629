//! Sequences a chat turn from user input to tree mutation.
//!
//! One turn at a time: the phase field doubles as the in-flight gate, and a
//! `send_message` arriving while a turn is active is rejected with
//! [`TurnRejection::Busy`]. Chat history is strictly append-ordered: the
//! user message lands before the backend call starts, the assistant message
//! after it resolves.

pub mod intent;
pub mod prompts;

use backend::{BackendSession, GenerationBackend};
use parking_lot::Mutex;
use shared::chat::ChatMessage;
use shared::error::TreeError;
use shared::notify::{NotificationSink, NullSink, Severity};
use shared::storage::KeyValueStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use tree::{Node, PathTree};

/// Where the current turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Validating,
    AwaitingBackend,
    ApplyingResult,
    Failed,
}

/// A turn that never started. No chat message is appended and no network
/// call is made for any of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnRejection {
    #[error("a generation turn is already in progress")]
    Busy,
    #[error("message is empty")]
    EmptyPrompt,
    #[error("backend is not connected")]
    NotConnected,
    #[error("no model selected")]
    NoModelSelected,
    #[error("model \"{0}\" is not available on the backend")]
    ModelUnavailable(String),
}

/// What a completed turn did to the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A new file was created at this path and selected.
    CreatedFile(String),
    /// The file at this path was rewritten.
    UpdatedFile(String),
    /// Chat-only reply, tree untouched.
    Replied,
    /// Backend failure; the message is what was shown to the user.
    Failed(String),
}

struct OrchestratorState {
    session: BackendSession,
    tree: PathTree,
    history: Vec<ChatMessage>,
    selected_path: Option<String>,
    phase: TurnPhase,
}

/// Holds the in-flight claim for one turn. Resets the phase gate to `Idle`
/// on drop, so an abandoned `send_message` future releases the gate instead
/// of wedging every later turn on `Busy`.
struct TurnClaim<'a> {
    state: &'a Mutex<OrchestratorState>,
}

impl Drop for TurnClaim<'_> {
    fn drop(&mut self) {
        self.state.lock().phase = TurnPhase::Idle;
    }
}

/// Seeded single-page project new sessions start from.
pub fn starter_project() -> PathTree {
    let content = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>My App</title>
</head>
<body>
    <div class="container">
        <h1>Welcome to Your App</h1>
        <p>Start building something amazing! Use the chat to generate or modify your code.</p>
    </div>
</body>
</html>
"#;
    PathTree::from_roots(vec![Node::file("index.html", content)])
        .unwrap_or_else(|_| PathTree::new())
}

pub struct Orchestrator<B: GenerationBackend> {
    backend: B,
    state: Mutex<OrchestratorState>,
    notifier: Arc<dyn NotificationSink>,
    mirror: Option<Arc<dyn KeyValueStore>>,
}

impl<B: GenerationBackend> Orchestrator<B> {
    /// Starts with the seeded starter project, its first file selected,
    /// and no notifier or mirror attached.
    pub fn new(backend: B) -> Self {
        let tree = starter_project();
        let selected_path = tree.first_file_path();
        Self {
            backend,
            state: Mutex::new(OrchestratorState {
                session: BackendSession::new(),
                tree,
                history: Vec::new(),
                selected_path,
                phase: TurnPhase::Idle,
            }),
            notifier: Arc::new(NullSink),
            mirror: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Attach a best-effort write-through mirror. Every applied content
    /// write is copied to it keyed by path; it is never read back.
    pub fn with_mirror(mut self, mirror: Arc<dyn KeyValueStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_tree(self, tree: PathTree) -> Self {
        {
            let mut state = self.state.lock();
            state.selected_path = tree.first_file_path();
            state.tree = tree;
        }
        self
    }

    // ---- snapshots -------------------------------------------------------

    pub fn tree(&self) -> PathTree {
        self.state.lock().tree.clone()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().history.clone()
    }

    pub fn session(&self) -> BackendSession {
        self.state.lock().session.clone()
    }

    pub fn selected_file(&self) -> Option<String> {
        self.state.lock().selected_path.clone()
    }

    pub fn phase(&self) -> TurnPhase {
        self.state.lock().phase
    }

    // ---- connection and selection ---------------------------------------

    /// Probe the backend and reload the model catalog. Posts a notification
    /// either way and returns whether the backend answered.
    pub async fn check_connection(&self) -> bool {
        let mut refreshed = self.state.lock().session.clone();
        let selection_before = refreshed.selected_model.clone();
        let connected = refreshed.refresh(&self.backend).await;

        {
            // Merge field by field: a `select_model` call that landed while
            // the refresh was on the network must not be clobbered by the
            // stale clone.
            let mut state = self.state.lock();
            state.session.connected = refreshed.connected;
            state.session.available_models = refreshed.available_models;
            state.session.last_check = refreshed.last_check;
            if state.session.selected_model == selection_before {
                state.session.selected_model = refreshed.selected_model;
            }
        }

        if connected {
            self.notifier
                .notify("Connected", "Generation backend is reachable.", Severity::Info);
        } else {
            self.notifier.notify(
                "Connection failed",
                "Make sure the generation backend is running and reachable.",
                Severity::Error,
            );
        }
        connected
    }

    /// Select a model by name. Not validated here; the next turn checks it
    /// against the cached catalog.
    pub fn select_model(&self, name: impl Into<String>) {
        self.state.lock().session.select_model(name);
    }

    /// Select the generation target for turns that do not name a new file.
    /// Only files are selectable; returns whether the selection changed.
    pub fn select_file(&self, path: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        let path = path.into();
        match state.tree.find(&path) {
            Some(node) if node.is_file() => {
                state.selected_path = Some(path);
                true
            }
            _ => false,
        }
    }

    // ---- generation turn -------------------------------------------------

    /// Run one generation turn. Rejections leave history and tree untouched
    /// and never reach the network.
    pub async fn send_message(&self, input: &str) -> Result<TurnOutcome, TurnRejection> {
        let input = input.trim().to_string();

        let (model, outbound, _claim) = {
            let mut state = self.state.lock();
            if state.phase != TurnPhase::Idle {
                return Err(TurnRejection::Busy);
            }
            state.phase = TurnPhase::Validating;

            match Self::validate(&state, &input) {
                Ok(model) => {
                    state.history.push(ChatMessage::user(input.clone()));

                    let mut outbound =
                        Vec::with_capacity(state.history.len() + 1);
                    outbound.push(ChatMessage::system(prompts::system_prompt(&state.tree)));
                    outbound.extend(state.history.iter().cloned());

                    state.phase = TurnPhase::AwaitingBackend;
                    (model, outbound, TurnClaim { state: &self.state })
                }
                Err(rejection) => {
                    state.phase = TurnPhase::Idle;
                    return Err(rejection);
                }
            }
        };

        // Lock is not held across the suspension point; `_claim` resets the
        // gate even if this future is dropped here.
        let reply = self.backend.chat(&model, &outbound).await;

        let mut state = self.state.lock();
        let outcome = match reply {
            Ok(reply) => {
                state.phase = TurnPhase::ApplyingResult;
                self.apply_reply(&mut state, &input, &reply)
            }
            Err(err) => {
                state.phase = TurnPhase::Failed;
                let text = format!("I ran into a problem: {}. {}", err, err.remedy());
                warn!(error = %err, "generation turn failed");
                state.history.push(ChatMessage::assistant(text.clone()));
                self.notifier
                    .notify("Generation failed", &text, Severity::Error);
                TurnOutcome::Failed(text)
            }
        };
        // The guard drops after this lock is released and moves the phase
        // back to Idle.
        drop(state);
        Ok(outcome)
    }

    fn validate(state: &OrchestratorState, input: &str) -> Result<String, TurnRejection> {
        if input.is_empty() {
            return Err(TurnRejection::EmptyPrompt);
        }
        if !state.session.connected {
            return Err(TurnRejection::NotConnected);
        }
        let model = state
            .session
            .selected_model
            .clone()
            .ok_or(TurnRejection::NoModelSelected)?;
        // Answered from the cached catalog, not the network.
        if !state.session.model_available(&model) {
            return Err(TurnRejection::ModelUnavailable(model));
        }
        Ok(model)
    }

    fn apply_reply(
        &self,
        state: &mut OrchestratorState,
        input: &str,
        reply: &str,
    ) -> TurnOutcome {
        let target = intent::requested_file_name(input)
            .filter(|name| state.tree.find(name).is_none())
            .map(str::to_string);
        let code = intent::extract_code(reply);

        if let Some(name) = target {
            // Chat-created files always land at the root.
            match state.tree.insert("", Node::file(&name, code)) {
                Ok(next) => {
                    state.tree = next;
                    state.selected_path = Some(name.clone());
                    self.mirror_write(&name, code);
                    let summary =
                        format!("Created new file \"{name}\" based on your request.");
                    state.history.push(ChatMessage::assistant(summary));
                    self.notifier
                        .notify("Code generated", &format!("Created {name}"), Severity::Info);
                    return TurnOutcome::CreatedFile(name);
                }
                Err(err) => {
                    debug!(error = %err, "create intent fell back to update");
                }
            }
        }

        if let Some(path) = state.selected_path.clone() {
            match state.tree.update(&path, code) {
                Ok(next) => {
                    state.tree = next;
                    self.mirror_write(&path, code);
                    let summary = format!("Updated \"{path}\" based on your request.");
                    state.history.push(ChatMessage::assistant(summary));
                    self.notifier
                        .notify("Code generated", &format!("Updated {path}"), Severity::Info);
                    return TurnOutcome::UpdatedFile(path);
                }
                Err(err) => {
                    debug!(error = %err, "selected file missing, replying chat-only");
                }
            }
        }

        state.history.push(ChatMessage::assistant(reply));
        TurnOutcome::Replied
    }

    // ---- manual project operations ---------------------------------------

    /// Manual "new file" with extension-based starter content. Empty
    /// `parent_path` creates at the root.
    pub fn create_file(&self, name: &str, parent_path: &str) -> Result<String, TreeError> {
        let mut state = self.state.lock();
        let content = intent::starter_content(name);
        let next = state
            .tree
            .insert(parent_path, Node::file(name, &content))?;
        state.tree = next;
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        };
        state.selected_path = Some(path.clone());
        drop(state);
        self.mirror_write(&path, &content);
        Ok(path)
    }

    /// Editor save path.
    pub fn update_file(&self, path: &str, content: &str) -> Result<(), TreeError> {
        let mut state = self.state.lock();
        let next = state.tree.update(path, content)?;
        state.tree = next;
        drop(state);
        self.mirror_write(path, content);
        Ok(())
    }

    /// Remove a file or a whole folder subtree. Absent paths are a no-op.
    pub fn delete_file(&self, path: &str) {
        let mut state = self.state.lock();
        state.tree = state.tree.remove(path);
        if state.selected_path.as_deref() == Some(path)
            || state
                .selected_path
                .as_deref()
                .is_some_and(|p| p.starts_with(&format!("{path}/")))
        {
            state.selected_path = state.tree.first_file_path();
        }
        drop(state);
        if let Some(mirror) = &self.mirror {
            mirror.remove(path);
        }
    }

    fn mirror_write(&self, path: &str, content: &str) {
        if let Some(mirror) = &self.mirror {
            mirror.set(path, content);
        }
    }
}
