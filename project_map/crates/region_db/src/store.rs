use async_trait::async_trait;
use reconciler::{RegionSnapshot, RegionStore, StoreError};

use crate::db::RegionDb;

// Each call is a single short statement, run inline on the calling task.
#[async_trait]
impl RegionStore for RegionDb {
    async fn region_count(&self) -> Result<usize, StoreError> {
        Ok(self.regions(|r| r.count())?)
    }

    async fn regions_page(&self, offset: usize, limit: usize) -> Result<Vec<RegionSnapshot>, StoreError> {
        Ok(self.regions(|r| r.page(offset, limit))?)
    }

    async fn set_buildings_count(&self, region_id: &str, count: u64) -> Result<(), StoreError> {
        Ok(self.regions(|r| r.set_buildings(region_id, count))?)
    }

    async fn set_search_display_name(&self, region_id: &str, display_name: &str) -> Result<(), StoreError> {
        Ok(self.regions(|r| r.set_search_display_name(region_id, display_name))?)
    }
}
