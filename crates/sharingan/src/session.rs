/// Audit session controller.
///
/// Owns the `idle → scanning → complete | error` state machine and the in-memory copy of
/// the history list. Every transition takes the core lock and runs to completion, so
/// transitions never interleave.
///
/// Each `scan`, `reset` and `load_history_item` advances a generation counter. A scan's
/// network call is never cancelled; when it finishes, its result is applied only if its
/// generation is still current, otherwise it is discarded without touching state or
/// history.
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditError, Auditor};
use crate::error::AppError;
use crate::history::{HistoryStore, HISTORY_LIMIT};
use crate::model::{AuditResponse, AuditSessionState, HistoryItem, ScanMode};
use crate::prompt::{build_request, ImageEvidence};

/// Validated form input for one scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub company: String,
    pub mode: ScanMode,
    pub competitor: Option<String>,
    pub image: Option<ImageEvidence>,
}

impl ScanRequest {
    /// Rejects a blank brand name; a blank competitor counts as none.
    pub fn new(
        company: &str,
        mode: ScanMode,
        competitor: Option<&str>,
        image: Option<ImageEvidence>,
    ) -> Result<Self, AppError> {
        let company = company.trim();
        if company.is_empty() {
            return Err(AppError::Input("brand name must not be empty".to_string()));
        }
        let competitor = competitor
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Ok(Self {
            company: company.to_string(),
            mode,
            competitor,
            image,
        })
    }
}

struct SessionCore {
    generation: u64,
    history: Vec<HistoryItem>,
}

struct Shared<A> {
    auditor: A,
    store: HistoryStore,
    core: Mutex<SessionCore>,
    state: watch::Sender<AuditSessionState>,
}

pub struct AuditSession<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for AuditSession<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Handle on one in-flight scan.
pub struct ScanTicket {
    pub generation: u64,
    handle: JoinHandle<bool>,
}

impl ScanTicket {
    /// Wait for the scan to finish. `true` if its result became the session state, `false`
    /// if it was superseded.
    pub async fn wait(self) -> bool {
        self.handle
            .await
            .inspect_err(|e| warn!(error = %e, generation = self.generation, "scan task failed"))
            .unwrap_or(false)
    }
}

impl<A: Auditor> AuditSession<A> {
    pub async fn open(auditor: A, store: HistoryStore) -> Self {
        let history = store.load().await;
        info!(entries = history.len(), "audit session opened");
        let (state, _) = watch::channel(AuditSessionState::Idle);
        Self {
            shared: Arc::new(Shared {
                auditor,
                store,
                core: Mutex::new(SessionCore {
                    generation: 0,
                    history,
                }),
                state,
            }),
        }
    }

    pub fn state(&self) -> AuditSessionState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuditSessionState> {
        self.shared.state.subscribe()
    }

    /// History, newest first.
    pub async fn history(&self) -> Vec<HistoryItem> {
        self.shared.core.lock().await.history.clone()
    }

    /// Start a scan. Any previous result or error is cleared at once; a scan still in
    /// flight is superseded.
    pub async fn scan(&self, request: ScanRequest) -> ScanTicket {
        let generation = {
            let mut core = self.shared.core.lock().await;
            core.generation += 1;
            self.shared.state.send_replace(AuditSessionState::Scanning);
            core.generation
        };
        info!(
            generation,
            company = %request.company,
            mode = %request.mode,
            competitor = request.competitor.as_deref().unwrap_or(""),
            image = request.image.is_some(),
            "scan started"
        );

        let ScanRequest {
            company,
            mode,
            competitor,
            image,
        } = request;
        let audit_request = build_request(&company, mode, competitor.as_deref(), image);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let result = shared.auditor.submit(audit_request).await;
            shared.settle(generation, &company, mode, result).await
        });
        ScanTicket { generation, handle }
    }

    /// Back to idle. History is untouched.
    pub async fn reset(&self) {
        let mut core = self.shared.core.lock().await;
        core.generation += 1;
        self.shared.state.send_replace(AuditSessionState::Idle);
        debug!(generation = core.generation, "session reset");
    }

    /// Show a stored audit. No network involved.
    pub async fn load_history_item(&self, id: &str) -> Result<Arc<AuditResponse>, AppError> {
        let mut core = self.shared.core.lock().await;
        let data = core
            .history
            .iter()
            .find(|item| item.id == id)
            .map(|item| Arc::clone(&item.data))
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        core.generation += 1;
        self.shared
            .state
            .send_replace(AuditSessionState::Complete(Arc::clone(&data)));
        debug!(generation = core.generation, id, "history item loaded");
        Ok(data)
    }
}

impl<A> Shared<A> {
    async fn settle(
        &self,
        generation: u64,
        company: &str,
        mode: ScanMode,
        result: Result<AuditResponse, AuditError>,
    ) -> bool {
        let item = {
            let mut core = self.core.lock().await;
            if core.generation != generation {
                debug!(
                    generation,
                    current = core.generation,
                    ok = result.is_ok(),
                    "discarding stale scan result"
                );
                return false;
            }

            match result {
                Ok(response) => {
                    let data = Arc::new(response);
                    self.state
                        .send_replace(AuditSessionState::Complete(Arc::clone(&data)));

                    let item = HistoryItem::new(company, mode, data);
                    core.history.insert(0, item.clone());
                    core.history.truncate(HISTORY_LIMIT);
                    info!(generation, company, "scan complete");
                    Some(item)
                }
                Err(e) => {
                    warn!(generation, company, error = %e, "scan failed");
                    self.state.send_replace(AuditSessionState::Error(e.to_string()));
                    None
                }
            }
        };

        // Persist outside the core lock so a slow slot never stalls transitions.
        if let Some(item) = item {
            self.store.append(item).await;
        }
        true
    }
}
