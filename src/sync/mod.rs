// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Debounced synchronization of the canvas model into storage.
//!
//! [`SyncState`] is the pure per-diagram state machine (`Clean -> Dirty -> Saving ->
//! Clean | Dirty`), driven by explicit timestamps so transitions are deterministic.
//! [`Synchronizer`] is the async driver around it: a timer plus a single-slot pending
//! flush, sending the full current element list (one upsert per element, not a diff)
//! through the [`FlushTarget`] transport. A full flush trades redundant writes for
//! robustness over computing a minimal diff.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::canvas::CanvasModel;
use crate::model::{DiagramId, ElementRecord};

/// Delay between the last dirty transition and the automatic flush.
pub const DEFAULT_DEBOUNCE_MS: i64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// Transport or storage unreachable. The model stays dirty; a later cycle retries.
    Unavailable,
    /// The server refused the flush (for example the diagram no longer exists).
    Rejected { status: u16 },
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => f.write_str("flush transport unavailable"),
            Self::Rejected { status } => write!(f, "flush rejected (status {status})"),
        }
    }
}

impl std::error::Error for FlushError {}

/// Thin transport the synchronizer flushes through.
///
/// Implementations perform one upsert per element against the relation manager;
/// they must not reorder or drop elements.
pub trait FlushTarget: Send + Sync {
    fn flush(
        &self,
        diagram_id: &DiagramId,
        elements: &[ElementRecord],
    ) -> impl Future<Output = Result<(), FlushError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Clean,
    Dirty,
    Saving,
}

/// Result of completing a flush against the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// The completion matched the current target and was applied.
    Applied,
    /// The synchronizer was re-armed for a different diagram (or no flush slot was
    /// open); the completion is discarded.
    Stale,
}

/// Pure per-diagram synchronization state machine.
///
/// All methods take the current time explicitly; the driver supplies timer-based
/// timestamps and tests supply fixed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    target: Option<DiagramId>,
    phase: SyncPhase,
    debounce_ms: i64,
    deadline_ms: Option<i64>,
    dirtied_while_saving: bool,
    last_flush_ms: Option<i64>,
}

impl SyncState {
    pub fn new(debounce_ms: i64) -> Self {
        Self {
            target: None,
            phase: SyncPhase::Clean,
            debounce_ms,
            deadline_ms: None,
            dirtied_while_saving: false,
            last_flush_ms: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn target(&self) -> Option<&DiagramId> {
        self.target.as_ref()
    }

    pub fn deadline_ms(&self) -> Option<i64> {
        self.deadline_ms
    }

    pub fn last_flush_ms(&self) -> Option<i64> {
        self.last_flush_ms
    }

    /// Re-arms the synchronizer fresh for another diagram (or none). In-flight
    /// flushes are not awaited; their completions become stale.
    pub fn retarget(&mut self, target: Option<DiagramId>) {
        self.target = target;
        self.phase = SyncPhase::Clean;
        self.deadline_ms = None;
        self.dirtied_while_saving = false;
    }

    /// Records a model mutation. Every dirty transition resets the debounce timer;
    /// a mutation during an in-flight flush re-dirties once that flush completes.
    pub fn note_dirty(&mut self, now_ms: i64) {
        if self.target.is_none() {
            return;
        }
        self.deadline_ms = Some(now_ms + self.debounce_ms);
        match self.phase {
            SyncPhase::Clean => self.phase = SyncPhase::Dirty,
            SyncPhase::Dirty => {}
            SyncPhase::Saving => self.dirtied_while_saving = true,
        }
    }

    pub fn flush_due(&self, now_ms: i64) -> bool {
        self.phase == SyncPhase::Dirty
            && self.deadline_ms.is_some_and(|deadline| now_ms >= deadline)
    }

    /// Opens the flush slot for a debounced flush. Returns the captured diagram id
    /// the completion must be checked against.
    pub fn begin_flush(&mut self) -> Option<DiagramId> {
        if self.phase != SyncPhase::Dirty {
            return None;
        }
        let captured = self.target.clone()?;
        self.phase = SyncPhase::Saving;
        self.deadline_ms = None;
        self.dirtied_while_saving = false;
        Some(captured)
    }

    /// Opens the flush slot for a manual save, short-circuiting the debounce. Works
    /// from `Clean` as well; refuses only while another flush is in flight.
    pub fn begin_manual_flush(&mut self) -> Option<DiagramId> {
        if self.phase == SyncPhase::Saving {
            return None;
        }
        let captured = self.target.clone()?;
        self.phase = SyncPhase::Saving;
        self.deadline_ms = None;
        self.dirtied_while_saving = false;
        Some(captured)
    }

    /// Applies a flush completion, discarding it if the synchronizer has since been
    /// re-armed for a different diagram.
    ///
    /// Success returns to `Clean` (or straight to `Dirty` if the model changed while
    /// the flush was in flight). Failure returns to `Dirty` with no timer armed: a
    /// retry rides the next user edit or an explicit manual save, never a backoff
    /// schedule.
    pub fn finish_flush(
        &mut self,
        captured: &DiagramId,
        success: bool,
        now_ms: i64,
    ) -> FinishOutcome {
        if self.phase != SyncPhase::Saving || self.target.as_ref() != Some(captured) {
            return FinishOutcome::Stale;
        }

        if success {
            self.last_flush_ms = Some(now_ms);
            if self.dirtied_while_saving {
                self.phase = SyncPhase::Dirty;
            } else {
                self.phase = SyncPhase::Clean;
            }
        } else {
            self.phase = SyncPhase::Dirty;
            self.deadline_ms = None;
        }
        self.dirtied_while_saving = false;
        FinishOutcome::Applied
    }
}

/// Async driver: debounce timer plus single-slot pending flush around a shared
/// [`CanvasModel`].
///
/// The UI mutates the model, then calls [`Synchronizer::note_dirty`]. A spawned
/// [`Synchronizer::run`] loop performs debounced flushes; [`Synchronizer::save_now`]
/// flushes immediately whether or not a run loop is active.
pub struct Synchronizer<T: FlushTarget> {
    model: Arc<Mutex<CanvasModel>>,
    target: T,
    state: Mutex<SyncState>,
    notify: Notify,
    epoch: tokio::time::Instant,
}

impl<T: FlushTarget> Synchronizer<T> {
    pub fn new(model: Arc<Mutex<CanvasModel>>, target: T, debounce_ms: i64) -> Self {
        Self {
            model,
            target,
            state: Mutex::new(SyncState::new(debounce_ms)),
            notify: Notify::new(),
            epoch: tokio::time::Instant::now(),
        }
    }

    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    pub async fn phase(&self) -> SyncPhase {
        self.state.lock().await.phase()
    }

    pub async fn last_flush_ms(&self) -> Option<i64> {
        self.state.lock().await.last_flush_ms()
    }

    /// Re-arms for another diagram. Does not wait for in-flight flushes; their
    /// completions are discarded by the captured-id check.
    pub async fn open_diagram(&self, diagram_id: Option<DiagramId>) {
        self.state.lock().await.retarget(diagram_id);
        self.notify.notify_one();
    }

    /// Called after every dirtying model mutation.
    pub async fn note_dirty(&self) {
        self.state.lock().await.note_dirty(self.now_ms());
        self.notify.notify_one();
    }

    /// Manual save: flushes immediately, short-circuiting the debounce. Returns
    /// whether a flush actually ran (false when no diagram is open or another flush
    /// holds the slot).
    pub async fn save_now(&self) -> Result<bool, FlushError> {
        let Some(captured) = self.state.lock().await.begin_manual_flush() else {
            return Ok(false);
        };
        self.flush(captured).await.map(|_| true)
    }

    /// Autosave loop. Runs until the owning task is dropped.
    pub async fn run(&self) {
        loop {
            let deadline = {
                let state = self.state.lock().await;
                match state.deadline_ms() {
                    Some(deadline) if state.phase() == SyncPhase::Dirty => Some(deadline),
                    _ => None,
                }
            };

            match deadline {
                None => self.notify.notified().await,
                Some(deadline) => {
                    let now = self.now_ms();
                    if now < deadline {
                        let sleep = tokio::time::sleep(Duration::from_millis(
                            (deadline - now) as u64,
                        ));
                        tokio::select! {
                            () = self.notify.notified() => continue,
                            () = sleep => {}
                        }
                    }
                    let captured = {
                        let mut state = self.state.lock().await;
                        if !state.flush_due(self.now_ms()) {
                            continue;
                        }
                        state.begin_flush()
                    };
                    if let Some(captured) = captured {
                        if let Err(err) = self.flush(captured).await {
                            tracing::warn!(error = %err, "debounced flush failed; will retry on next edit");
                        }
                    }
                }
            }
        }
    }

    /// One full flush through the slot opened by `begin_flush`/`begin_manual_flush`.
    async fn flush(&self, captured: DiagramId) -> Result<(), FlushError> {
        let elements: Vec<ElementRecord> = {
            let model = self.model.lock().await;
            model.nodes().to_vec()
        };

        let result = self.target.flush(&captured, &elements).await;

        let outcome = self
            .state
            .lock()
            .await
            .finish_flush(&captured, result.is_ok(), self.now_ms());

        if outcome == FinishOutcome::Applied && result.is_ok() {
            let mut model = self.model.lock().await;
            // Only clear the flag if the synchronizer is still on this diagram and
            // reached Clean; a concurrent edit keeps the model dirty.
            if model.diagram_id() == Some(&captured)
                && self.state.lock().await.phase() == SyncPhase::Clean
            {
                model.mark_clean();
            }
        }
        result
    }
}
