//! Per-user drawing session.
//!
//! Holds the drawn shapes, user exclusions and the current results. Every
//! change recomputes the place list from scratch; postcode sampling runs
//! outside the session and its result is applied only if nothing has
//! superseded it in the meantime.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{BoundingBox, Shape, ShapeError, UK_BOUNDS};
use crate::postcodes::SampleReport;
use crate::region::{filter_places, FilterOutcome, PlaceFilter, PlaceIndex, SortOrder};

pub type ShapeId = u64;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),
    #[error("no shape with id {0}")]
    UnknownShape(ShapeId),
}

/// Events emitted by the drawing surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DrawEvent {
    Created { shape: Shape },
    Edited { id: ShapeId, shape: Shape },
    Deleted { ids: Vec<ShapeId> },
    Cleared,
}

/// Handed out when sampling starts; only the newest ticket may publish results
#[derive(Debug, Clone)]
pub struct SamplingTicket {
    generation: u64,
    pub shapes: Vec<Shape>,
}

/// Outcome of the last applied sampling run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SamplingStatus {
    pub chunks_total: usize,
    pub chunks_failed: usize,
    pub total_failure: bool,
}

#[derive(Debug)]
pub struct Session {
    bounds: BoundingBox,
    shapes: BTreeMap<ShapeId, Shape>,
    next_shape_id: ShapeId,
    excluded: HashSet<String>,
    population_min: u64,
    sort: SortOrder,
    places: FilterOutcome,
    postcodes: BTreeSet<String>,
    sampling: Option<SamplingStatus>,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_bounds(UK_BOUNDS)
    }

    /// Session whose shapes must fit inside `bounds`
    pub fn with_bounds(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            shapes: BTreeMap::new(),
            next_shape_id: 0,
            excluded: HashSet::new(),
            population_min: 0,
            sort: SortOrder::default(),
            places: FilterOutcome::default(),
            postcodes: BTreeSet::new(),
            sampling: None,
            generation: 0,
        }
    }

    /// Apply a drawing event and recompute places.
    ///
    /// Postcodes from earlier runs no longer describe the shapes, so any
    /// change drops them until the next sampling run. Returns the id of a
    /// newly created shape.
    pub fn apply(&mut self, event: DrawEvent, index: &PlaceIndex) -> Result<Option<ShapeId>, SessionError> {
        let mut created = None;

        match event {
            DrawEvent::Created { shape } => {
                shape.validate_within(&self.bounds)?;
                let id = self.next_shape_id;
                self.next_shape_id += 1;
                self.shapes.insert(id, shape);
                created = Some(id);
            }
            DrawEvent::Edited { id, shape } => {
                shape.validate_within(&self.bounds)?;
                let slot = self.shapes.get_mut(&id).ok_or(SessionError::UnknownShape(id))?;
                *slot = shape;
            }
            DrawEvent::Deleted { ids } => {
                if let Some(missing) = ids.iter().find(|id| !self.shapes.contains_key(id)) {
                    return Err(SessionError::UnknownShape(*missing));
                }
                for id in ids {
                    self.shapes.remove(&id);
                }
            }
            DrawEvent::Cleared => self.shapes.clear(),
        }

        self.generation += 1;
        self.postcodes.clear();
        self.sampling = None;

        self.recompute(index);
        Ok(created)
    }

    /// Hide a place until exclusions are cleared
    pub fn exclude(&mut self, name: &str, index: &PlaceIndex) {
        self.excluded.insert(name.to_string());
        self.recompute(index);
    }

    pub fn clear_exclusions(&mut self, index: &PlaceIndex) {
        self.excluded.clear();
        self.recompute(index);
    }

    pub fn set_population_min(&mut self, population_min: u64, index: &PlaceIndex) {
        self.population_min = population_min;
        self.recompute(index);
    }

    pub fn set_sort(&mut self, sort: SortOrder, index: &PlaceIndex) {
        self.sort = sort;
        self.recompute(index);
    }

    fn recompute(&mut self, index: &PlaceIndex) {
        let filter = PlaceFilter {
            population_min: self.population_min,
            excluded: self.excluded.clone(),
            sort: self.sort,
        };
        let shapes: Vec<Shape> = self.shapes.values().cloned().collect();
        self.places = filter_places(index, &shapes, &filter);

        debug!(
            "Recomputed session: {} shapes, {} places, {} excluded",
            self.shapes.len(),
            self.places.len(),
            self.excluded.len()
        );
    }

    /// Start a sampling run over the current shapes, superseding any run in flight
    pub fn begin_sampling(&mut self) -> Option<SamplingTicket> {
        if self.shapes.is_empty() {
            return None;
        }
        self.generation += 1;
        Some(SamplingTicket {
            generation: self.generation,
            shapes: self.shapes.values().cloned().collect(),
        })
    }

    /// Publish a finished run. Returns `false` if the ticket was superseded.
    pub fn complete_sampling(&mut self, ticket: SamplingTicket, report: SampleReport) -> bool {
        if ticket.generation != self.generation {
            debug!(
                "Discarding stale sampling result (generation {} < {})",
                ticket.generation, self.generation
            );
            return false;
        }

        self.sampling = Some(SamplingStatus {
            chunks_total: report.chunks_total,
            chunks_failed: report.chunks_failed,
            total_failure: report.total_failure(),
        });
        self.postcodes = report.postcodes;
        true
    }

    /// Drop one postcode from the current set
    pub fn remove_postcode(&mut self, postcode: &str) -> bool {
        self.postcodes.remove(postcode)
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
        self.shapes.iter().map(|(id, shape)| (*id, shape))
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn places(&self) -> &FilterOutcome {
        &self.places
    }

    pub fn postcodes(&self) -> &BTreeSet<String> {
        &self.postcodes
    }

    pub fn sampling_status(&self) -> Option<SamplingStatus> {
        self.sampling
    }

    pub fn population_min(&self) -> u64 {
        self.population_min
    }

    /// Excluded names, sorted
    pub fn excluded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.excluded.iter().cloned().collect();
        names.sort();
        names
    }
}

/// Sessions keyed by id, evicted once idle for longer than `idle_ttl`
#[derive(Debug)]
pub struct SessionStore {
    sessions: hashbrown::HashMap<Uuid, StoredSession>,
    idle_ttl: Duration,
    bounds: BoundingBox,
}

#[derive(Debug)]
struct StoredSession {
    session: Session,
    touched: Instant,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration, bounds: BoundingBox) -> Self {
        Self {
            sessions: hashbrown::HashMap::new(),
            idle_ttl,
            bounds,
        }
    }

    pub fn create(&mut self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            StoredSession {
                session: Session::with_bounds(self.bounds),
                touched: Instant::now(),
            },
        );
        id
    }

    /// Look up a session and mark it as used
    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(id).map(|stored| {
            stored.touched = Instant::now();
            &mut stored.session
        })
    }

    pub fn remove(&mut self, id: &Uuid) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Drop sessions idle since before `now - idle_ttl`. Returns how many went.
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        let ttl = self.idle_ttl;
        self.sessions
            .retain(|_, stored| now.saturating_duration_since(stored.touched) <= ttl);

        let evicted = before - self.sessions.len();
        if evicted > 0 {
            info!("Evicted {} idle sessions, {} remain", evicted, self.sessions.len());
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, Place};

    fn index() -> PlaceIndex {
        PlaceIndex::build(vec![
            Place::new("Leeds", 53.8008, -1.5491, 812_000),
            Place::new("York", 53.9590, -1.0815, 202_800),
            Place::new("Selby", 53.7836, -1.0670, 17_519),
        ])
    }

    fn around_york() -> Shape {
        Shape::circle(GeoPoint::new(53.9590, -1.0815), 10_000.0)
    }

    fn yorkshire() -> Shape {
        Shape::rectangle(GeoPoint::new(53.5, -2.0), GeoPoint::new(54.2, -0.9))
    }

    fn names(session: &Session) -> Vec<String> {
        session.places().places().iter().map(|p| p.name.clone()).collect()
    }

    fn report(codes: &[&str]) -> SampleReport {
        SampleReport {
            postcodes: codes.iter().map(|c| c.to_string()).collect(),
            chunks_total: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_session_has_no_shapes() {
        let session = Session::new();
        assert_eq!(session.places(), &FilterOutcome::NoShapesDrawn);
    }

    #[test]
    fn test_exclusion_survives_redraw() {
        let index = index();
        let mut session = Session::new();

        let id = session
            .apply(DrawEvent::Created { shape: around_york() }, &index)
            .unwrap()
            .unwrap();
        assert_eq!(names(&session), vec!["York"]);

        session.exclude("York", &index);
        assert!(session.places().is_empty_result());

        session.apply(DrawEvent::Deleted { ids: vec![id] }, &index).unwrap();
        session.apply(DrawEvent::Created { shape: yorkshire() }, &index).unwrap();
        assert_eq!(names(&session), vec!["Leeds", "Selby"]);

        session.clear_exclusions(&index);
        assert_eq!(names(&session), vec!["Leeds", "York", "Selby"]);
    }

    #[test]
    fn test_population_filter_recomputes() {
        let index = index();
        let mut session = Session::new();
        session.apply(DrawEvent::Created { shape: yorkshire() }, &index).unwrap();

        session.set_population_min(200_000, &index);
        assert_eq!(names(&session), vec!["Leeds", "York"]);

        session.set_sort(SortOrder::PopulationDesc, &index);
        session.set_population_min(0, &index);
        assert_eq!(names(&session), vec!["Leeds", "York", "Selby"]);
    }

    #[test]
    fn test_edit_replaces_shape() {
        let index = index();
        let mut session = Session::new();
        let id = session
            .apply(DrawEvent::Created { shape: around_york() }, &index)
            .unwrap()
            .unwrap();

        session.apply(DrawEvent::Edited { id, shape: yorkshire() }, &index).unwrap();
        assert_eq!(session.shape_count(), 1);
        assert_eq!(session.places().len(), 3);
    }

    #[test]
    fn test_unknown_and_invalid_shapes_rejected() {
        let index = index();
        let mut session = Session::new();

        let err = session.apply(DrawEvent::Deleted { ids: vec![7] }, &index).unwrap_err();
        assert_eq!(err, SessionError::UnknownShape(7));

        let bad = Shape::polygon(vec![GeoPoint::new(0.0, 0.0)]);
        let err = session.apply(DrawEvent::Created { shape: bad }, &index).unwrap_err();
        assert_eq!(err, SessionError::InvalidShape(ShapeError::TooFewVertices(1)));
        assert_eq!(session.shape_count(), 0);
    }

    #[test]
    fn test_removing_last_shape_clears_postcodes() {
        let index = index();
        let mut session = Session::new();
        let id = session
            .apply(DrawEvent::Created { shape: yorkshire() }, &index)
            .unwrap()
            .unwrap();

        let ticket = session.begin_sampling().unwrap();
        assert!(session.complete_sampling(ticket, report(&["YO1", "LS1"])));
        assert_eq!(session.postcodes().len(), 2);

        session.apply(DrawEvent::Deleted { ids: vec![id] }, &index).unwrap();
        assert!(session.postcodes().is_empty());
        assert_eq!(session.places(), &FilterOutcome::NoShapesDrawn);
        assert!(session.begin_sampling().is_none());
    }

    #[test]
    fn test_shape_changes_drop_postcodes() {
        let index = index();
        let mut session = Session::new();
        let york = session
            .apply(DrawEvent::Created { shape: around_york() }, &index)
            .unwrap()
            .unwrap();
        let leeds = session
            .apply(DrawEvent::Created { shape: yorkshire() }, &index)
            .unwrap()
            .unwrap();

        let ticket = session.begin_sampling().unwrap();
        session.complete_sampling(ticket, report(&["YO1", "LS1"]));

        let london = Shape::circle(GeoPoint::new(51.5074, -0.1278), 10_000.0);
        session.apply(DrawEvent::Edited { id: york, shape: london }, &index).unwrap();
        assert!(session.postcodes().is_empty());
        assert!(session.sampling_status().is_none());

        let ticket = session.begin_sampling().unwrap();
        session.complete_sampling(ticket, report(&["EC1"]));
        session.apply(DrawEvent::Deleted { ids: vec![leeds] }, &index).unwrap();
        assert_eq!(session.shape_count(), 1);
        assert!(session.postcodes().is_empty());
    }

    #[test]
    fn test_shapes_outside_bounds_rejected() {
        let index = index();
        let mut session = Session::new();

        let globe = Shape::circle(GeoPoint::new(52.0, -1.0), 20_000_000.0);
        let err = session.apply(DrawEvent::Created { shape: globe }, &index).unwrap_err();
        assert_eq!(err, SessionError::InvalidShape(ShapeError::OutsideBounds));
        assert!(session.begin_sampling().is_none());

        let mut wide = Session::with_bounds(BoundingBox::new(-90.0, -180.0, 90.0, 180.0));
        let paris = Shape::circle(GeoPoint::new(48.85, 2.35), 5_000.0);
        assert!(wide.apply(DrawEvent::Created { shape: paris }, &index).is_ok());
    }

    #[test]
    fn test_store_evicts_idle_sessions() {
        let ttl = Duration::from_secs(60);
        let mut store = SessionStore::new(ttl, UK_BOUNDS);
        let stale = store.create();
        let fresh = store.create();
        assert_eq!(store.len(), 2);

        let later = Instant::now() + Duration::from_secs(30);
        assert_eq!(store.evict_idle(later), 0);

        // Touching resets the idle clock
        let much_later = Instant::now() + ttl + Duration::from_secs(1);
        store.sessions.get_mut(&fresh).unwrap().touched = much_later;
        assert_eq!(store.evict_idle(much_later), 1);
        assert!(store.get_mut(&stale).is_none());
        assert!(store.get_mut(&fresh).is_some());

        assert!(store.remove(&fresh));
        assert!(!store.remove(&fresh));
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_sampling_is_discarded() {
        let index = index();
        let mut session = Session::new();
        session.apply(DrawEvent::Created { shape: yorkshire() }, &index).unwrap();

        let first = session.begin_sampling().unwrap();
        session.apply(DrawEvent::Created { shape: around_york() }, &index).unwrap();
        let second = session.begin_sampling().unwrap();
        assert_eq!(second.shapes.len(), 2);

        assert!(session.complete_sampling(second, report(&["YO1"])));
        assert!(!session.complete_sampling(first, report(&["LS1"])));
        assert_eq!(session.postcodes().iter().collect::<Vec<_>>(), vec!["YO1"]);
    }

    #[test]
    fn test_sampling_replaces_whole_set() {
        let index = index();
        let mut session = Session::new();
        session.apply(DrawEvent::Created { shape: yorkshire() }, &index).unwrap();

        let ticket = session.begin_sampling().unwrap();
        session.complete_sampling(ticket, report(&["YO1", "YO8"]));
        assert!(session.remove_postcode("YO8"));

        let ticket = session.begin_sampling().unwrap();
        session.complete_sampling(ticket, report(&["LS1"]));
        assert_eq!(session.postcodes().iter().collect::<Vec<_>>(), vec!["LS1"]);
        assert_eq!(session.sampling_status().map(|s| s.total_failure), Some(false));
    }

    #[test]
    fn test_draw_event_json() {
        let json = r#"{"event":"deleted","ids":[1,2]}"#;
        let event: DrawEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, DrawEvent::Deleted { ids: vec![1, 2] });
    }
}
