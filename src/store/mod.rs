pub mod backend;
pub mod change;
pub mod debounce;
pub mod export;
pub mod migrate;
pub mod mirror;
pub mod persistence;
pub mod state;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    error::StorageError,
    models::{
        GeneralInfo, Inspection, MeasurementDocument, MeasurementPoint, Photo, QualitativeData,
        TechnicalInfo, WeatherConditions,
    },
};

pub use backend::{KvBackend, StorageKey};
pub use change::{has_changed, touch, DocumentPatch};
pub use debounce::DebouncedWriter;
pub use export::export_as_string;
pub use migrate::migrate;
pub use mirror::FileMirror;
pub use persistence::{CatalogRead, PersistenceWriter, SaveReport};
pub use state::{transition, Action, NavigationHints, StoreState, TransitionContext};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const RETRY_WARNING: &str = "Your changes could not be saved yet. They will be retried shortly.";
const CORRUPT_CATALOG_WARNING: &str = "Some saved forms could not be read and were skipped.";

/// How a document mutation reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Save right away; on failure fall back to a debounced retry.
    Immediate,
    /// Low-frequency edits, coalesced by the debounced writer.
    Debounced,
}

/// What happened to a mutation after the state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The document did not change, or there is no open document.
    Unchanged,
    Saved,
    /// Handed to the debounced writer.
    Deferred,
}

/// Save policy for actions that edit the open document; `None` for the rest.
pub fn save_policy(action: &Action) -> Option<SavePolicy> {
    match action {
        Action::UpdateWeather(_) | Action::UpdateTechnicalInfo(_) | Action::UpdateQualitative(_) => {
            Some(SavePolicy::Debounced)
        }
        Action::UpdateGeneralInfo(_)
        | Action::UpdateInspection(_)
        | Action::AddPoint(_)
        | Action::UpdatePoint(_)
        | Action::DeletePoint { .. }
        | Action::ReorderPoints { .. }
        | Action::AddResult(_)
        | Action::UpdateResult(_)
        | Action::DeleteResult(_)
        | Action::ReorderResults { .. }
        | Action::AddEvent(_)
        | Action::UpdateEvent(_)
        | Action::DeleteEvent { .. }
        | Action::ReorderEvents { .. }
        | Action::AddPhoto(_)
        | Action::UpdatePhoto(_)
        | Action::DeletePhoto { .. }
        | Action::ReorderPhotos { .. } => Some(SavePolicy::Immediate),
        Action::ReplaceCurrent(_)
        | Action::SetCatalog(_)
        | Action::UpsertCatalog(_)
        | Action::DeleteFromCatalog { .. }
        | Action::MarkSaved { .. }
        | Action::SetLoading(_)
        | Action::SetError(_)
        | Action::SetWarning(_)
        | Action::SetNavigationHints(_)
        | Action::ClearNavigationHints => None,
    }
}

struct StoreInner<B> {
    state: Mutex<StoreState>,
    writer: PersistenceWriter<B>,
}

impl<B: KvBackend> StoreInner<B> {
    /// Applies `action` and returns the open document before and after.
    async fn dispatch(
        &self,
        action: Action,
    ) -> (Option<MeasurementDocument>, Option<MeasurementDocument>) {
        let baseline = self.writer.baseline().await;
        let mut state = self.state.lock().await;
        let before = state.current.clone();
        let ctx = TransitionContext {
            baseline: baseline.as_ref(),
            now: Utc::now(),
        };
        *state = transition(std::mem::take(&mut *state), action, ctx);
        (before, state.current.clone())
    }

    async fn save_document(
        &self,
        document: MeasurementDocument,
    ) -> Result<MeasurementDocument, StorageError> {
        match self.writer.save(document).await {
            Ok(report) => {
                if !report.warnings.is_empty() {
                    self.dispatch(Action::SetWarning(Some(CORRUPT_CATALOG_WARNING.into())))
                        .await;
                }
                let saved = report.document;
                self.dispatch(Action::MarkSaved {
                    document_id: saved.id.clone(),
                    updated_at: saved.updated_at,
                })
                .await;
                self.dispatch(Action::UpsertCatalog(saved.clone())).await;
                Ok(saved)
            }
            Err(err) => {
                log_error!("save failed: {err}");
                self.dispatch(Action::SetError(Some(err.user_message())))
                    .await;
                Err(err)
            }
        }
    }
}

/// The store screens talk to: owns the in-memory state, the baseline snapshot
/// (through its writer) and the debounced writer task.
///
/// Must be created inside a tokio runtime.
pub struct MeasurementStore<B> {
    inner: Arc<StoreInner<B>>,
    debouncer: DebouncedWriter,
}

impl<B> Clone for MeasurementStore<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            debouncer: self.debouncer.clone(),
        }
    }
}

impl<B: KvBackend> MeasurementStore<B> {
    pub fn new(backend: Arc<B>, mirror: Option<FileMirror>, quiet_period: Duration) -> Self {
        let inner = Arc::new(StoreInner {
            state: Mutex::new(StoreState::default()),
            writer: PersistenceWriter::new(backend, mirror),
        });

        let sink_inner = inner.clone();
        let (debouncer, _task) = DebouncedWriter::spawn(quiet_period, move |document| {
            let inner = sink_inner.clone();
            async move {
                let id = document.id.clone();
                match inner.save_document(document).await {
                    Ok(_) => log_info!("deferred save of {id} completed"),
                    Err(err) => log_warn!("deferred save of {id} failed: {err}"),
                }
            }
        });

        Self { inner, debouncer }
    }

    // ---- reads ----

    pub async fn snapshot(&self) -> StoreState {
        self.inner.state.lock().await.clone()
    }

    pub async fn current_document(&self) -> Option<MeasurementDocument> {
        self.inner.state.lock().await.current.clone()
    }

    pub async fn saved_catalog(&self) -> Vec<MeasurementDocument> {
        self.inner.state.lock().await.catalog.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.state.lock().await.is_loading
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.state.lock().await.error.clone()
    }

    pub async fn warning(&self) -> Option<String> {
        self.inner.state.lock().await.warning.clone()
    }

    pub async fn navigation_hints(&self) -> NavigationHints {
        self.inner.state.lock().await.navigation.clone()
    }

    /// Whether the open document still lacks its identifying fields. True
    /// when nothing is open.
    pub async fn current_is_incomplete(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .current
            .as_ref()
            .map_or(true, MeasurementDocument::is_incomplete)
    }

    pub async fn baseline(&self) -> Option<MeasurementDocument> {
        self.inner.writer.baseline().await
    }

    // ---- document lifecycle ----

    /// Opens a fresh document. Nothing is written until the first save.
    pub async fn create_document(&self) -> MeasurementDocument {
        let document = MeasurementDocument::new(Utc::now());
        self.load_document(document.clone()).await;
        log_info!("created document {}", document.id);
        document
    }

    /// Makes `document` the open document and its baseline. A pending
    /// deferred save of the previous document is written first.
    pub async fn load_document(&self, document: MeasurementDocument) {
        self.debouncer.flush().await;
        self.inner
            .writer
            .reset_baseline(Some(document.clone()))
            .await;
        self.inner
            .dispatch(Action::ReplaceCurrent(Some(document)))
            .await;
    }

    /// Reopens the document left in the `CURRENT` slot by a previous run.
    pub async fn restore_current(&self) -> Result<Option<MeasurementDocument>, StorageError> {
        let (document, warnings) = self.inner.writer.read_current().await?;
        if !warnings.is_empty() {
            self.inner
                .dispatch(Action::SetWarning(Some(CORRUPT_CATALOG_WARNING.into())))
                .await;
        }
        if let Some(document) = document.clone() {
            self.load_document(document).await;
        }
        Ok(document)
    }

    /// Closes the open document, forgets its baseline and empties the
    /// `CURRENT` slot. A pending deferred save is written first.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.debouncer.flush().await;

        self.inner.dispatch(Action::ReplaceCurrent(None)).await;
        self.inner.dispatch(Action::ClearNavigationHints).await;
        self.inner.writer.reset_baseline(None).await;

        if let Err(err) = self.inner.writer.remove_current().await {
            self.inner
                .dispatch(Action::SetError(Some(err.user_message())))
                .await;
            return Err(err);
        }
        Ok(())
    }

    // ---- mutations ----

    /// Applies one action and persists the result according to
    /// [`save_policy`]. Actions that do not edit the document only update
    /// in-memory state.
    pub async fn mutate(&self, action: Action) -> MutationOutcome {
        let policy = save_policy(&action);
        let (before, after) = self.inner.dispatch(action).await;

        let (Some(policy), Some(after)) = (policy, after) else {
            return MutationOutcome::Unchanged;
        };
        if before.as_ref() == Some(&after) {
            return MutationOutcome::Unchanged;
        }

        match policy {
            SavePolicy::Immediate => self.persist_now(after).await,
            SavePolicy::Debounced => {
                self.debouncer.schedule(after);
                MutationOutcome::Deferred
            }
        }
    }

    async fn persist_now(&self, document: MeasurementDocument) -> MutationOutcome {
        // The document being written already contains its deferred edits.
        self.debouncer.discard(&document.id);
        match self.inner.save_document(document.clone()).await {
            Ok(_) => MutationOutcome::Saved,
            Err(err) => {
                log_warn!(
                    "immediate save of {} failed, arming deferred retry: {err}",
                    document.id
                );
                self.debouncer.schedule(document);
                self.inner
                    .dispatch(Action::SetWarning(Some(RETRY_WARNING.into())))
                    .await;
                MutationOutcome::Deferred
            }
        }
    }

    pub async fn mutate_general_info(&self, info: GeneralInfo) -> MutationOutcome {
        self.mutate(Action::UpdateGeneralInfo(info)).await
    }

    pub async fn mutate_weather(&self, weather: WeatherConditions) -> MutationOutcome {
        self.mutate(Action::UpdateWeather(weather)).await
    }

    pub async fn mutate_technical_info(&self, technical: TechnicalInfo) -> MutationOutcome {
        self.mutate(Action::UpdateTechnicalInfo(technical)).await
    }

    pub async fn mutate_inspection(&self, inspection: Inspection) -> MutationOutcome {
        self.mutate(Action::UpdateInspection(inspection)).await
    }

    pub async fn mutate_qualitative(&self, qualitative: QualitativeData) -> MutationOutcome {
        self.mutate(Action::UpdateQualitative(qualitative)).await
    }

    pub async fn mutate_add_point(&self, point: MeasurementPoint) -> MutationOutcome {
        self.mutate(Action::AddPoint(point)).await
    }

    /// Removes the point together with its results and photos.
    pub async fn mutate_delete_point(&self, point_id: &str) -> MutationOutcome {
        self.mutate(Action::DeletePoint {
            point_id: point_id.to_string(),
        })
        .await
    }

    pub async fn mutate_add_photo(&self, photo: Photo) -> MutationOutcome {
        self.mutate(Action::AddPhoto(photo)).await
    }

    pub async fn mutate_delete_photo(&self, photo_id: &str) -> MutationOutcome {
        self.mutate(Action::DeletePhoto {
            photo_id: photo_id.to_string(),
        })
        .await
    }

    pub async fn set_navigation_hints(&self, hints: NavigationHints) {
        self.inner.dispatch(Action::SetNavigationHints(hints)).await;
    }

    pub async fn clear_navigation_hints(&self) {
        self.inner.dispatch(Action::ClearNavigationHints).await;
    }

    pub async fn dismiss_warning(&self) {
        self.inner.dispatch(Action::SetWarning(None)).await;
    }

    // ---- persistence ----

    /// Saves `override_document` when given, otherwise the open document.
    /// Callers that just computed the next state pass it here so the save
    /// does not depend on that state having been read back first.
    pub async fn save(
        &self,
        override_document: Option<MeasurementDocument>,
    ) -> Result<MeasurementDocument, StorageError> {
        let document = match override_document {
            Some(document) => document,
            None => self
                .current_document()
                .await
                .ok_or(StorageError::NoDocument)?,
        };
        self.debouncer.discard(&document.id);
        self.inner.save_document(document).await
    }

    /// Saves any pending deferred document now.
    pub async fn flush_pending(&self) {
        self.debouncer.flush().await;
    }

    /// Reads, migrates and publishes the saved catalog. Migrated data is
    /// written back once.
    pub async fn load_catalog(&self) -> Result<Vec<MeasurementDocument>, StorageError> {
        self.inner.dispatch(Action::SetLoading(true)).await;

        let read = match self.inner.writer.read_catalog().await {
            Ok(read) => read,
            Err(err) => {
                log_error!("loading catalog failed: {err}");
                self.inner
                    .dispatch(Action::SetError(Some(err.user_message())))
                    .await;
                self.inner.dispatch(Action::SetLoading(false)).await;
                return Err(err);
            }
        };

        if read.migrated {
            match self
                .inner
                .writer
                .write_catalog(&read.documents, &read.unreadable)
                .await
            {
                Ok(()) => log_info!("wrote back {} migrated document(s)", read.documents.len()),
                // The migrated copy is still served; migration reruns next load.
                Err(err) => {
                    log_warn!("writing migrated catalog failed: {err}");
                    self.inner
                        .dispatch(Action::SetError(Some(err.user_message())))
                        .await;
                }
            }
        }
        if !read.warnings.is_empty() {
            self.inner
                .dispatch(Action::SetWarning(Some(CORRUPT_CATALOG_WARNING.into())))
                .await;
        }

        self.inner
            .dispatch(Action::SetCatalog(read.documents.clone()))
            .await;
        self.inner.dispatch(Action::SetLoading(false)).await;
        Ok(read.documents)
    }

    /// Removes a saved document. Closes it too if it is the open one.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), StorageError> {
        self.debouncer.flush().await;

        if let Err(err) = self.inner.writer.delete(document_id).await {
            log_error!("deleting {document_id} failed: {err}");
            self.inner
                .dispatch(Action::SetError(Some(err.user_message())))
                .await;
            return Err(err);
        }

        self.inner
            .dispatch(Action::DeleteFromCatalog {
                document_id: document_id.to_string(),
            })
            .await;
        self.inner.dispatch(Action::SetError(None)).await;

        let is_open = self
            .current_document()
            .await
            .is_some_and(|doc| doc.id == document_id);
        if is_open {
            self.clear().await?;
        }
        Ok(())
    }

    /// Export text for `document`; see [`export_as_string`].
    pub fn export_as_string(&self, document: &MeasurementDocument) -> Result<String, StorageError> {
        export::export_as_string(document)
    }
}
