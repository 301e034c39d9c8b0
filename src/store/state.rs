use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    upsert_by_id, ExternalEvent, GeneralInfo, Inspection, MeasurementDocument, MeasurementPoint,
    MeasurementResult, Photo, QualitativeData, ResultKey, TechnicalInfo, WeatherConditions,
};

use super::change::{stamp_if_changed, touch, DocumentPatch};

/// Hints for the presentation layer, e.g. which point to scroll to after an
/// add. The store only carries them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationHints {
    pub focus_point_id: Option<String>,
    pub focus_result: Option<ResultKey>,
    pub return_to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub current: Option<MeasurementDocument>,
    pub catalog: Vec<MeasurementDocument>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub navigation: NavigationHints,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ReplaceCurrent(Option<MeasurementDocument>),

    UpdateGeneralInfo(GeneralInfo),
    UpdateWeather(WeatherConditions),
    UpdateTechnicalInfo(TechnicalInfo),
    UpdateInspection(Inspection),
    UpdateQualitative(QualitativeData),

    AddPoint(MeasurementPoint),
    UpdatePoint(MeasurementPoint),
    DeletePoint { point_id: String },
    ReorderPoints { from: usize, to: usize },

    AddResult(MeasurementResult),
    UpdateResult(MeasurementResult),
    DeleteResult(ResultKey),
    ReorderResults { from: usize, to: usize },

    AddEvent(ExternalEvent),
    UpdateEvent(ExternalEvent),
    DeleteEvent { event_id: String },
    ReorderEvents { from: usize, to: usize },

    AddPhoto(Photo),
    UpdatePhoto(Photo),
    DeletePhoto { photo_id: String },
    ReorderPhotos { from: usize, to: usize },

    SetCatalog(Vec<MeasurementDocument>),
    UpsertCatalog(MeasurementDocument),
    DeleteFromCatalog { document_id: String },
    /// A save of `document_id` completed with this `updated_at`.
    MarkSaved {
        document_id: String,
        updated_at: DateTime<Utc>,
    },

    SetLoading(bool),
    SetError(Option<String>),
    SetWarning(Option<String>),

    SetNavigationHints(NavigationHints),
    ClearNavigationHints,
}

/// Inputs a transition may depend on besides the state itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub baseline: Option<&'a MeasurementDocument>,
    pub now: DateTime<Utc>,
}

/// Pure state transition. Actions that do not apply to the current state
/// (no open document, unknown id, index out of range) return it unchanged.
pub fn transition(mut state: StoreState, action: Action, ctx: TransitionContext<'_>) -> StoreState {
    match action {
        Action::ReplaceCurrent(document) => {
            state.current = document;
        }

        Action::UpdateGeneralInfo(info) => {
            state = patch_current(state, ctx, DocumentPatch {
                general_info: Some(info),
                ..DocumentPatch::default()
            });
        }
        Action::UpdateWeather(weather) => {
            state = patch_current(state, ctx, DocumentPatch {
                weather_conditions: Some(weather),
                ..DocumentPatch::default()
            });
        }
        Action::UpdateTechnicalInfo(technical) => {
            state = patch_current(state, ctx, DocumentPatch {
                technical_info: Some(technical),
                ..DocumentPatch::default()
            });
        }
        Action::UpdateInspection(inspection) => {
            state = patch_current(state, ctx, DocumentPatch {
                inspection: Some(inspection),
                ..DocumentPatch::default()
            });
        }
        Action::UpdateQualitative(qualitative) => {
            state = patch_current(state, ctx, DocumentPatch {
                qualitative_data: Some(qualitative),
                ..DocumentPatch::default()
            });
        }

        Action::AddPoint(point) => {
            state = edit_current(state, ctx, |doc| {
                if doc.point(&point.id).is_none() {
                    doc.measurement_points.push(point);
                }
            });
        }
        Action::UpdatePoint(point) => {
            state = edit_current(state, ctx, |doc| {
                let id = point.id.clone();
                replace_where(&mut doc.measurement_points, |p| p.id == id, point);
            });
        }
        Action::DeletePoint { point_id } => {
            state = edit_current(state, ctx, |doc| {
                if doc.point(&point_id).is_some() {
                    doc.measurement_points.retain(|p| p.id != point_id);
                    doc.measurement_results.retain(|r| r.point_id != point_id);
                    doc.photos.retain(|photo| photo.point_id != point_id);
                }
            });
        }
        Action::ReorderPoints { from, to } => {
            state = edit_current(state, ctx, |doc| {
                move_item(&mut doc.measurement_points, from, to);
            });
        }

        Action::AddResult(result) => {
            state = edit_current(state, ctx, |doc| {
                let key = result.key();
                replace_or_push(&mut doc.measurement_results, |r| r.matches(&key), result);
            });
        }
        Action::UpdateResult(result) => {
            state = edit_current(state, ctx, |doc| {
                let key = result.key();
                replace_where(&mut doc.measurement_results, |r| r.matches(&key), result);
            });
        }
        Action::DeleteResult(key) => {
            state = edit_current(state, ctx, |doc| {
                doc.measurement_results.retain(|r| !r.matches(&key));
            });
        }
        Action::ReorderResults { from, to } => {
            state = edit_current(state, ctx, |doc| {
                move_item(&mut doc.measurement_results, from, to);
            });
        }

        Action::AddEvent(event) => {
            state = edit_current(state, ctx, |doc| {
                if !doc.external_events.iter().any(|e| e.id == event.id) {
                    doc.external_events.push(event);
                }
            });
        }
        Action::UpdateEvent(event) => {
            state = edit_current(state, ctx, |doc| {
                let id = event.id.clone();
                replace_where(&mut doc.external_events, |e| e.id == id, event);
            });
        }
        Action::DeleteEvent { event_id } => {
            state = edit_current(state, ctx, |doc| {
                doc.external_events.retain(|e| e.id != event_id);
            });
        }
        Action::ReorderEvents { from, to } => {
            state = edit_current(state, ctx, |doc| {
                move_item(&mut doc.external_events, from, to);
            });
        }

        // Photo edits always advance `updated_at`.
        Action::AddPhoto(photo) => {
            stamp_current(&mut state, ctx, |doc| {
                if !doc.photos.iter().any(|p| p.id == photo.id) {
                    doc.photos.push(photo);
                }
            });
        }
        Action::UpdatePhoto(photo) => {
            stamp_current(&mut state, ctx, |doc| {
                let id = photo.id.clone();
                replace_where(&mut doc.photos, |p| p.id == id, photo);
            });
        }
        Action::DeletePhoto { photo_id } => {
            stamp_current(&mut state, ctx, |doc| {
                doc.photos.retain(|p| p.id != photo_id);
            });
        }
        Action::ReorderPhotos { from, to } => {
            stamp_current(&mut state, ctx, |doc| {
                move_item(&mut doc.photos, from, to);
            });
        }

        Action::SetCatalog(catalog) => {
            state.catalog = catalog;
        }
        Action::UpsertCatalog(document) => {
            upsert_by_id(&mut state.catalog, document);
        }
        Action::DeleteFromCatalog { document_id } => {
            state.catalog.retain(|doc| doc.id != document_id);
        }
        Action::MarkSaved {
            document_id,
            updated_at,
        } => {
            if let Some(current) = state.current.as_mut().filter(|doc| doc.id == document_id) {
                current.updated_at = updated_at;
            }
            state.error = None;
        }

        Action::SetLoading(loading) => {
            state.is_loading = loading;
        }
        Action::SetError(error) => {
            state.error = error;
        }
        Action::SetWarning(warning) => {
            state.warning = warning;
        }

        Action::SetNavigationHints(hints) => {
            state.navigation = hints;
        }
        Action::ClearNavigationHints => {
            state.navigation = NavigationHints::default();
        }
    }

    state
}

fn patch_current(
    mut state: StoreState,
    ctx: TransitionContext<'_>,
    patch: DocumentPatch,
) -> StoreState {
    if let Some(current) = state.current.take() {
        state.current = Some(touch(&current, patch, ctx.baseline, ctx.now));
    }
    state
}

fn edit_current<F>(mut state: StoreState, ctx: TransitionContext<'_>, edit: F) -> StoreState
where
    F: FnOnce(&mut MeasurementDocument),
{
    if let Some(current) = state.current.take() {
        let mut next = current.clone();
        edit(&mut next);
        state.current = Some(stamp_if_changed(&current, next, ctx.baseline, ctx.now));
    }
    state
}

fn stamp_current<F>(state: &mut StoreState, ctx: TransitionContext<'_>, edit: F)
where
    F: FnOnce(&mut MeasurementDocument),
{
    if let Some(current) = state.current.as_mut() {
        edit(current);
        current.updated_at = ctx.now;
    }
}

fn replace_where<T, P>(items: &mut [T], predicate: P, replacement: T)
where
    P: Fn(&T) -> bool,
{
    if let Some(slot) = items.iter_mut().find(|item| predicate(item)) {
        *slot = replacement;
    }
}

fn replace_or_push<T, P>(items: &mut Vec<T>, predicate: P, item: T)
where
    P: Fn(&T) -> bool,
{
    match items.iter_mut().find(|existing| predicate(existing)) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}
