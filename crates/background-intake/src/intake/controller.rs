use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::domain::{DocumentCategory, Draft, FieldUpdate, StagedFile, WizardStep};
use super::gateway::{GatewayError, SubmissionGateway, SubmissionReceipt};
use super::progress::{
    ProgressAutosave, ProgressRecorder, ProgressStore, DEFAULT_SAVE_DEBOUNCE,
};
use super::staging::{StagingPolicy, StagingReport};
use super::storage::{ObjectStorage, SubmissionStore};
use super::validation::{validate_step, ValidationErrors};

/// Tunables for one wizard session.
#[derive(Debug, Clone)]
pub struct WizardOptions {
    pub save_debounce: Duration,
    pub staging: StagingPolicy,
}

impl Default for WizardOptions {
    fn default() -> Self {
        Self {
            save_debounce: DEFAULT_SAVE_DEBOUNCE,
            staging: StagingPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("{step} has errors: {errors}")]
    Rejected {
        step: WizardStep,
        errors: ValidationErrors,
    },
    #[error("the review step is completed by submitting the application")]
    SubmitRequired,
    #[error("the application can only be submitted from the review step (currently on {0})")]
    NotOnReview(WizardStep),
    #[error("a submission is already in progress")]
    SubmissionInFlight,
    #[error("the application has already been submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

struct WizardState {
    step: WizardStep,
    draft: Draft,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one applicant through the intake steps.
///
/// Every edit is merged into the draft and queued for a debounced progress
/// save. The step only moves forward after the current step validates, and
/// only the review step can submit.
pub struct WizardController<S, O, R>
where
    S: ProgressStore + 'static,
    O: ObjectStorage,
    R: SubmissionStore,
{
    state: Mutex<WizardState>,
    autosave: ProgressAutosave<S>,
    gateway: SubmissionGateway<O, R>,
    staging: StagingPolicy,
    submitting: AtomicBool,
    restored_at: Option<DateTime<Utc>>,
}

impl<S, O, R> WizardController<S, O, R>
where
    S: ProgressStore + 'static,
    O: ObjectStorage,
    R: SubmissionStore,
{
    /// Start a session, resuming from saved progress when there is any.
    pub fn new(store: Arc<S>, gateway: SubmissionGateway<O, R>, options: WizardOptions) -> Self {
        let recorder = Arc::new(ProgressRecorder::new(store));

        let (state, restored_at) = match recorder.load() {
            Some(snapshot) => {
                let step = snapshot.step();
                let saved_at = snapshot.last_saved;
                info!(step = %step, last_saved = %saved_at, "restored saved form progress");
                (
                    WizardState {
                        step,
                        draft: snapshot.into_draft(),
                    },
                    Some(saved_at),
                )
            }
            None => (
                WizardState {
                    step: WizardStep::Personal,
                    draft: Draft::default(),
                },
                None,
            ),
        };

        Self {
            state: Mutex::new(state),
            autosave: ProgressAutosave::new(recorder, options.save_debounce),
            gateway,
            staging: options.staging,
            submitting: AtomicBool::new(false),
            restored_at,
        }
    }

    fn state(&self) -> MutexGuard<'_, WizardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn step(&self) -> WizardStep {
        self.state().step
    }

    pub fn draft(&self) -> Draft {
        self.state().draft.clone()
    }

    /// When the resumed progress was last saved, if this session resumed.
    pub fn restored_at(&self) -> Option<DateTime<Utc>> {
        self.restored_at
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    pub fn autosave(&self) -> &ProgressAutosave<S> {
        &self.autosave
    }

    fn ensure_editable(&self, state: &WizardState) -> Result<(), WizardError> {
        if state.step.is_terminal() {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.is_submitting() {
            return Err(WizardError::SubmissionInFlight);
        }
        Ok(())
    }

    /// Merge a single field into the draft.
    pub fn update(&self, update: FieldUpdate) -> Result<(), WizardError> {
        let mut state = self.state();
        self.ensure_editable(&state)?;
        state.draft.apply(update, Utc::now());
        self.autosave.schedule(&state.draft, state.step);
        Ok(())
    }

    pub fn add_files(
        &self,
        category: DocumentCategory,
        files: Vec<StagedFile>,
    ) -> Result<StagingReport, WizardError> {
        let mut state = self.state();
        self.ensure_editable(&state)?;
        let report = state.draft.documents.stage(category, files, &self.staging);
        self.autosave.schedule(&state.draft, state.step);
        Ok(report)
    }

    pub fn remove_file(
        &self,
        category: DocumentCategory,
        index: usize,
    ) -> Result<Option<StagedFile>, WizardError> {
        let mut state = self.state();
        self.ensure_editable(&state)?;
        let removed = state.draft.documents.unstage(category, index);
        if removed.is_some() {
            self.autosave.schedule(&state.draft, state.step);
        }
        Ok(removed)
    }

    /// Validate the current step and move forward by one.
    pub fn next(&self) -> Result<WizardStep, WizardError> {
        let mut state = self.state();
        match state.step {
            WizardStep::Submitted => return Err(WizardError::AlreadySubmitted),
            WizardStep::Review => return Err(WizardError::SubmitRequired),
            _ => {}
        }

        let step = state.step;
        let accepted = validate_step(step, &state.draft).map_err(|errors| {
            debug!(step = %step, fields = errors.len(), "step rejected");
            WizardError::Rejected { step, errors }
        })?;

        let Some(following) = step.following() else {
            return Err(WizardError::SubmitRequired);
        };
        state.draft = accepted;
        state.step = following;
        self.autosave.schedule(&state.draft, state.step);
        debug!(from = %step, to = %following, "advanced");
        Ok(following)
    }

    /// Go back one step without validating. No-op on the first step, while
    /// a submission is in flight and after submission.
    pub fn previous(&self) -> WizardStep {
        let mut state = self.state();
        if state.step.is_terminal() || self.is_submitting() {
            return state.step;
        }
        if let Some(preceding) = state.step.preceding() {
            state.step = preceding;
            self.autosave.schedule(&state.draft, state.step);
        }
        state.step
    }

    /// Send the application. Only one submission may be in flight.
    pub async fn submit(&self) -> Result<SubmissionReceipt, WizardError> {
        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WizardError::SubmissionInFlight);
        }
        let _in_flight = InFlight(&self.submitting);

        let draft = {
            let state = self.state();
            let step = state.step;
            match step {
                WizardStep::Review => state.draft.clone(),
                WizardStep::Submitted => return Err(WizardError::AlreadySubmitted),
                other => return Err(WizardError::NotOnReview(other)),
            }
        };

        match self.gateway.submit(&draft).await {
            Ok(receipt) => {
                self.state().step = WizardStep::Submitted;
                self.autosave.cancel();
                self.autosave.recorder().clear();
                info!(submission_id = %receipt.submission_id, "application submitted");
                Ok(receipt)
            }
            Err(err) => {
                warn!(error = %err, "submission failed; staying on review");
                Err(err.into())
            }
        }
    }

    /// Write any pending progress immediately.
    pub fn flush_progress(&self) -> bool {
        self.autosave.flush()
    }
}
