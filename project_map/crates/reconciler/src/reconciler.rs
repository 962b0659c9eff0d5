use std::sync::Arc;
use std::time::Instant;

use observability::PassMetrics;
use tokio::task::JoinHandle;

use crate::error::{ReconcileError, SearchError};
use crate::ports::{
    BuildingCounter, RegionSnapshot, RegionStore, ReverseGeocoder, SearchDocument, SearchIndex,
};
use crate::progress::{PassTicket, ProgressGuard};

const BUILDINGS_PASS: &str = "buildings";
const DISPLAY_NAME_PASS: &str = "display_names";

/// External collaborators a reconciler works against.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn RegionStore>,
    pub counter: Arc<dyn BuildingCounter>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub search: Arc<dyn SearchIndex>,
}

/// Result of asking for a background pass.
#[derive(Debug)]
pub enum PassStart {
    /// The pass is running; `count` is the number of regions it will visit.
    Started {
        count: usize,
        task: JoinHandle<PassMetrics>,
    },
    AlreadyRunning,
}

enum Outcome {
    Processed,
    Skipped,
}

pub struct GeoReconciler {
    ports: Ports,
    page_size: usize,
    buildings: Arc<ProgressGuard>,
    display_names: Arc<ProgressGuard>,
}

impl GeoReconciler {
    pub fn new(ports: Ports, page_size: usize) -> Self {
        Self {
            ports,
            page_size: page_size.max(1),
            buildings: ProgressGuard::new(),
            display_names: ProgressGuard::new(),
        }
    }

    /// Regions finished by the running building pass: the zero-based loop
    /// index of the last finished region plus one, failures included. Reads
    /// `1` from the start until the first region finishes, and `0` when idle.
    /// The fraction done is `buildings_progress() / count`; do not add 1.
    pub fn buildings_progress(&self) -> u64 {
        self.buildings.progress()
    }

    /// Same readout as [`Self::buildings_progress`] for the display-name pass.
    pub fn display_name_progress(&self) -> u64 {
        self.display_names.progress()
    }

    /// Recount buildings inside every region, in the background.
    pub async fn calculate_all_buildings(self: &Arc<Self>, skip_old: bool) -> Result<PassStart, ReconcileError> {
        let Some(ticket) = self.buildings.try_start() else {
            tracing::info!(pass = BUILDINGS_PASS, "pass already running");
            return Ok(PassStart::AlreadyRunning);
        };
        let count = self.ports.store.region_count().await?;
        tracing::info!(pass = BUILDINGS_PASS, count, skip_old, "starting pass");

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            this.run_pass(BUILDINGS_PASS, count, ticket, |region| {
                let this = Arc::clone(&this);
                async move { this.count_region_buildings(region, skip_old).await }
            })
            .await
        });
        Ok(PassStart::Started { count, task })
    }

    /// Reverse-geocode every region's centroid, in the background.
    pub async fn get_osm_display_names(self: &Arc<Self>, skip_old: bool) -> Result<PassStart, ReconcileError> {
        let Some(ticket) = self.display_names.try_start() else {
            tracing::info!(pass = DISPLAY_NAME_PASS, "pass already running");
            return Ok(PassStart::AlreadyRunning);
        };
        let count = self.ports.store.region_count().await?;
        tracing::info!(pass = DISPLAY_NAME_PASS, count, skip_old, "starting pass");

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            this.run_pass(DISPLAY_NAME_PASS, count, ticket, |region| {
                let this = Arc::clone(&this);
                async move { this.resolve_region_display_name(region, skip_old).await }
            })
            .await
        });
        Ok(PassStart::Started { count, task })
    }

    /// Rebuild the search index from scratch. Returns the number of documents
    /// submitted.
    pub async fn sync_with_search_db(&self) -> Result<usize, ReconcileError> {
        let search = &self.ports.search;
        match search.delete_index().await {
            Ok(()) | Err(SearchError::IndexNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        search.create_index().await?;
        search.declare_geo_attributes().await?;

        let mut documents = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.ports.store.regions_page(offset, self.page_size).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for region in page {
                match geo::centroid(&region.vertices) {
                    Ok(center) => documents.push(SearchDocument {
                        id: region.id,
                        city: region.city,
                        geo: center.into(),
                        display_name: region.search_display_name,
                        username: region.username,
                    }),
                    Err(e) => {
                        tracing::warn!(region_id = %region.id, error = %e, "left out of search index");
                    }
                }
            }
        }

        search.add_documents(&documents).await?;
        tracing::info!(documents = documents.len(), "search index rebuilt");
        Ok(documents.len())
    }

    async fn run_pass<F, Fut>(&self, pass: &'static str, total: usize, ticket: PassTicket, mut step: F) -> PassMetrics
    where
        F: FnMut(RegionSnapshot) -> Fut,
        Fut: std::future::Future<Output = Result<Outcome, String>>,
    {
        let started = Instant::now();
        let mut metrics = PassMetrics::new(pass, total);
        let mut offset = 0;

        loop {
            let page = match self.ports.store.regions_page(offset, self.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(pass, offset, error = %e, "failed to read regions, aborting pass");
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            for (i, region) in page.into_iter().enumerate() {
                let index = offset + i;
                let region_id = region.id.clone();
                match step(region).await {
                    Ok(Outcome::Processed) => metrics.processed += 1,
                    Ok(Outcome::Skipped) => metrics.skipped += 1,
                    Err(message) => {
                        tracing::warn!(pass, region_id = %region_id, error = %message, "region failed");
                        metrics.failed += 1;
                    }
                }
                ticket.advance(index);
            }
            offset += page_len;
        }

        metrics.duration_ms = started.elapsed().as_millis();
        metrics.log();
        drop(ticket);
        metrics
    }

    async fn count_region_buildings(&self, region: RegionSnapshot, skip_old: bool) -> Result<Outcome, String> {
        if skip_old && region.buildings_count != 0 {
            return Ok(Outcome::Skipped);
        }
        let filter = geo::polygon_filter(&region.vertices);
        let count = self
            .ports
            .counter
            .count_buildings(&filter)
            .await
            .map_err(|e| e.to_string())?;
        self.ports
            .store
            .set_buildings_count(&region.id, count)
            .await
            .map_err(|e| e.to_string())?;
        tracing::debug!(region_id = %region.id, count, "buildings counted");
        Ok(Outcome::Processed)
    }

    async fn resolve_region_display_name(&self, region: RegionSnapshot, skip_old: bool) -> Result<Outcome, String> {
        if skip_old && region.search_display_name.is_some() {
            return Ok(Outcome::Skipped);
        }
        let center = geo::centroid(&region.vertices).map_err(|e| e.to_string())?;
        let name = self
            .ports
            .geocoder
            .display_name(center)
            .await
            .map_err(|e| e.to_string())?;
        let Some(name) = name else {
            return Ok(Outcome::Skipped);
        };
        self.ports
            .store
            .set_search_display_name(&region.id, &name)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Outcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServiceError, StoreError};
    use async_trait::async_trait;
    use geo::LatLon;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct MemoryStore {
        regions: Mutex<Vec<RegionSnapshot>>,
    }

    impl MemoryStore {
        fn with(regions: Vec<RegionSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                regions: Mutex::new(regions),
            })
        }

        fn get(&self, id: &str) -> RegionSnapshot {
            self.regions
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl RegionStore for MemoryStore {
        async fn region_count(&self) -> Result<usize, StoreError> {
            Ok(self.regions.lock().unwrap().len())
        }

        async fn regions_page(&self, offset: usize, limit: usize) -> Result<Vec<RegionSnapshot>, StoreError> {
            Ok(self
                .regions
                .lock()
                .unwrap()
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn set_buildings_count(&self, region_id: &str, count: u64) -> Result<(), StoreError> {
            let mut regions = self.regions.lock().unwrap();
            let region = regions
                .iter_mut()
                .find(|r| r.id == region_id)
                .ok_or_else(|| StoreError::RegionNotFound(region_id.to_string()))?;
            region.buildings_count = count;
            Ok(())
        }

        async fn set_search_display_name(&self, region_id: &str, display_name: &str) -> Result<(), StoreError> {
            let mut regions = self.regions.lock().unwrap();
            let region = regions
                .iter_mut()
                .find(|r| r.id == region_id)
                .ok_or_else(|| StoreError::RegionNotFound(region_id.to_string()))?;
            region.search_display_name = Some(display_name.to_string());
            Ok(())
        }
    }

    /// Count derived from the filter text, so each region gets a distinct value.
    #[derive(Default)]
    struct FilterLengthCounter {
        calls: Mutex<Vec<String>>,
        /// Calls that have reached the gate.
        entered: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl BuildingCounter for FilterLengthCounter {
        async fn count_buildings(&self, polygon_filter: &str) -> Result<u64, ServiceError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.calls.lock().unwrap().push(polygon_filter.to_string());
            if self.fail_on.as_deref() == Some(polygon_filter) {
                return Err(ServiceError::Malformed("boom".to_string()));
            }
            Ok(polygon_filter.len() as u64)
        }
    }

    #[derive(Default)]
    struct FixedGeocoder {
        names: Vec<(LatLon, &'static str)>,
        calls: Mutex<Vec<LatLon>>,
    }

    #[async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn display_name(&self, point: LatLon) -> Result<Option<String>, ServiceError> {
            self.calls.lock().unwrap().push(point);
            Ok(self
                .names
                .iter()
                .find(|(at, _)| (at.lat - point.lat).abs() < 1e-9 && (at.lon - point.lon).abs() < 1e-9)
                .map(|(_, name)| name.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        calls: Mutex<Vec<&'static str>>,
        documents: Mutex<Vec<SearchDocument>>,
        missing: bool,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn delete_index(&self) -> Result<(), SearchError> {
            self.calls.lock().unwrap().push("delete");
            if self.missing {
                return Err(SearchError::IndexNotFound("regions".to_string()));
            }
            Ok(())
        }

        async fn create_index(&self) -> Result<(), SearchError> {
            self.calls.lock().unwrap().push("create");
            Ok(())
        }

        async fn declare_geo_attributes(&self) -> Result<(), SearchError> {
            self.calls.lock().unwrap().push("settings");
            Ok(())
        }

        async fn add_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError> {
            self.calls.lock().unwrap().push("documents");
            self.documents.lock().unwrap().extend_from_slice(documents);
            Ok(())
        }
    }

    fn square(id: &str, lat: f64, lon: f64, size: f64) -> RegionSnapshot {
        RegionSnapshot {
            id: id.to_string(),
            vertices: vec![
                LatLon::new(lat, lon),
                LatLon::new(lat, lon + size),
                LatLon::new(lat + size, lon + size),
                LatLon::new(lat + size, lon),
            ],
            city: format!("city-{id}"),
            username: format!("user-{id}"),
            buildings_count: 0,
            search_display_name: None,
        }
    }

    /// Names the point (1, 1) "Middle".
    fn middle_geocoder() -> Arc<FixedGeocoder> {
        Arc::new(FixedGeocoder {
            names: vec![(LatLon::new(1.0, 1.0), "Middle")],
            ..Default::default()
        })
    }

    fn reconciler(
        store: Arc<MemoryStore>,
        counter: Arc<FilterLengthCounter>,
        search: Arc<RecordingIndex>,
        page_size: usize,
    ) -> Arc<GeoReconciler> {
        reconciler_with_geocoder(store, counter, middle_geocoder(), search, page_size)
    }

    fn reconciler_with_geocoder(
        store: Arc<MemoryStore>,
        counter: Arc<FilterLengthCounter>,
        geocoder: Arc<FixedGeocoder>,
        search: Arc<RecordingIndex>,
        page_size: usize,
    ) -> Arc<GeoReconciler> {
        let ports = Ports {
            store,
            counter,
            geocoder,
            search,
        };
        Arc::new(GeoReconciler::new(ports, page_size))
    }

    async fn wait_until(mut ready: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !ready() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn completed_building_pass_writes_counts_and_resets() {
        let regions = vec![
            square("a", 0.0, 0.0, 2.0),
            square("b", 10.0, 10.0, 1.5),
            square("c", 20.0, 20.0, 0.25),
        ];
        let store = MemoryStore::with(regions.clone());
        let counter = Arc::new(FilterLengthCounter::default());
        let r = reconciler(store.clone(), counter.clone(), Arc::default(), 2);

        let PassStart::Started { count, task } = r.calculate_all_buildings(false).await.unwrap() else {
            panic!("pass should start");
        };
        assert_eq!(count, 3);
        let metrics = task.await.unwrap();

        assert_eq!(metrics.processed, 3);
        assert_eq!(r.buildings_progress(), 0);
        for region in &regions {
            let expected = geo::polygon_filter(&region.vertices).len() as u64;
            assert_eq!(store.get(&region.id).buildings_count, expected);
        }
        assert_eq!(counter.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn skip_old_leaves_counted_regions_alone() {
        let mut counted = square("a", 0.0, 0.0, 2.0);
        counted.buildings_count = 42;
        let store = MemoryStore::with(vec![counted, square("b", 5.0, 5.0, 1.0)]);
        let counter = Arc::new(FilterLengthCounter::default());
        let r = reconciler(store.clone(), counter.clone(), Arc::default(), 10);

        let PassStart::Started { task, .. } = r.calculate_all_buildings(true).await.unwrap() else {
            panic!("pass should start");
        };
        let metrics = task.await.unwrap();

        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.processed, 1);
        assert_eq!(store.get("a").buildings_count, 42);
        assert_ne!(store.get("b").buildings_count, 0);
        assert_eq!(counter.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_start_reports_already_running() {
        let gate = Arc::new(Notify::new());
        let store = MemoryStore::with(vec![square("a", 0.0, 0.0, 2.0)]);
        let counter = Arc::new(FilterLengthCounter {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let r = reconciler(store.clone(), counter.clone(), Arc::default(), 10);

        let PassStart::Started { task, .. } = r.calculate_all_buildings(false).await.unwrap() else {
            panic!("pass should start");
        };
        assert!(r.buildings_progress() >= 1);

        let again = r.calculate_all_buildings(false).await.unwrap();
        assert!(matches!(again, PassStart::AlreadyRunning));

        gate.notify_one();
        task.await.unwrap();
        assert_eq!(counter.calls.lock().unwrap().len(), 1);
        assert_eq!(r.buildings_progress(), 0);
    }

    #[tokio::test]
    async fn failing_region_does_not_stop_the_pass() {
        let bad = square("bad", 0.0, 0.0, 2.0);
        let store = MemoryStore::with(vec![bad.clone(), square("good", 5.0, 5.0, 1.0)]);
        let counter = Arc::new(FilterLengthCounter {
            fail_on: Some(geo::polygon_filter(&bad.vertices)),
            ..Default::default()
        });
        let r = reconciler(store.clone(), counter, Arc::default(), 1);

        let PassStart::Started { task, .. } = r.calculate_all_buildings(false).await.unwrap() else {
            panic!("pass should start");
        };
        let metrics = task.await.unwrap();

        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.processed, 1);
        assert_eq!(store.get("bad").buildings_count, 0);
        assert_ne!(store.get("good").buildings_count, 0);
    }

    #[tokio::test]
    async fn progress_advances_past_failed_region() {
        let gate = Arc::new(Notify::new());
        let bad = square("bad", 5.0, 5.0, 1.0);
        let store = MemoryStore::with(vec![
            square("a", 0.0, 0.0, 2.0),
            bad.clone(),
            square("c", 9.0, 9.0, 1.0),
        ]);
        let counter = Arc::new(FilterLengthCounter {
            gate: Some(gate.clone()),
            fail_on: Some(geo::polygon_filter(&bad.vertices)),
            ..Default::default()
        });
        let r = reconciler(store.clone(), counter.clone(), Arc::default(), 10);

        let PassStart::Started { task, .. } = r.calculate_all_buildings(false).await.unwrap() else {
            panic!("pass should start");
        };

        for entered in 1..=2 {
            wait_until(|| counter.entered.load(Ordering::SeqCst) == entered).await;
            gate.notify_one();
        }
        // Third region is parked at the gate; the failed second one still counts.
        wait_until(|| counter.entered.load(Ordering::SeqCst) == 3).await;
        assert_eq!(r.buildings_progress(), 2);

        gate.notify_one();
        let metrics = task.await.unwrap();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.processed, 2);
        assert_eq!(r.buildings_progress(), 0);
    }

    #[tokio::test]
    async fn display_name_skip_old_does_not_query_named_regions() {
        let mut named = square("named", 0.0, 0.0, 2.0);
        named.search_display_name = Some("Kept".to_string());
        let store = MemoryStore::with(vec![named, square("fresh", 0.5, 0.5, 1.0)]);
        let geocoder = middle_geocoder();
        let r = reconciler_with_geocoder(store.clone(), Arc::default(), geocoder.clone(), Arc::default(), 10);

        let PassStart::Started { task, .. } = r.get_osm_display_names(true).await.unwrap() else {
            panic!("pass should start");
        };
        let metrics = task.await.unwrap();

        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.processed, 1);
        assert_eq!(store.get("named").search_display_name.as_deref(), Some("Kept"));
        assert_eq!(store.get("fresh").search_display_name.as_deref(), Some("Middle"));
        let calls = geocoder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!((calls[0].lat - 1.0).abs() < 1e-9 && (calls[0].lon - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn display_names_resolved_from_centroid() {
        let mut degenerate = square("flat", 3.0, 3.0, 1.0);
        degenerate.vertices.truncate(2);
        let store = MemoryStore::with(vec![
            square("a", 0.0, 0.0, 2.0),
            square("far", 40.0, 40.0, 1.0),
            degenerate,
        ]);
        let r = reconciler(store.clone(), Arc::default(), Arc::default(), 10);

        let PassStart::Started { task, .. } = r.get_osm_display_names(false).await.unwrap() else {
            panic!("pass should start");
        };
        let metrics = task.await.unwrap();

        assert_eq!(store.get("a").search_display_name.as_deref(), Some("Middle"));
        assert_eq!(store.get("far").search_display_name, None);
        assert_eq!(metrics.processed, 1);
        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(r.display_name_progress(), 0);
    }

    #[tokio::test]
    async fn search_sync_submits_one_document_per_region() {
        let regions = vec![
            square("a", 0.0, 0.0, 2.0),
            square("b", 48.1, 11.5, 0.01),
            square("c", -33.9, 151.2, 0.5),
        ];
        let store = MemoryStore::with(regions.clone());
        let index = Arc::new(RecordingIndex {
            missing: true,
            ..Default::default()
        });
        let r = reconciler(store, Arc::default(), index.clone(), 2);

        let submitted = r.sync_with_search_db().await.unwrap();

        assert_eq!(submitted, 3);
        assert_eq!(
            *index.calls.lock().unwrap(),
            vec!["delete", "create", "settings", "documents"]
        );
        let docs = index.documents.lock().unwrap();
        assert_eq!(docs.len(), 3);
        for (doc, region) in docs.iter().zip(&regions) {
            let center = geo::centroid(&region.vertices).unwrap();
            assert_eq!(doc.id, region.id);
            assert!((doc.geo.lat - center.lat).abs() < 1e-6);
            assert!((doc.geo.lng - center.lon).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn search_sync_skips_invalid_geometry() {
        let mut broken = square("broken", 0.0, 0.0, 1.0);
        broken.vertices = vec![LatLon::new(0.0, 0.0); 4];
        let store = MemoryStore::with(vec![broken, square("ok", 1.0, 1.0, 1.0)]);
        let index = Arc::new(RecordingIndex::default());
        let r = reconciler(store, Arc::default(), index.clone(), 10);

        assert_eq!(r.sync_with_search_db().await.unwrap(), 1);
        assert_eq!(index.documents.lock().unwrap()[0].id, "ok");
    }
}
