//! Bridges the driver's raw snapshot queries into the view builder's port.

use async_trait::async_trait;
use ax_view::{AxViewError, FrameAxSnapshot, FrameDomSnapshot, PerceptionPort};
use cdp_adapter::PageDriver;

pub struct PagePerception<'a> {
    driver: &'a PageDriver,
}

impl<'a> PagePerception<'a> {
    pub fn new(driver: &'a PageDriver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl<'a> PerceptionPort for PagePerception<'a> {
    async fn full_ax_trees(&self) -> Result<Vec<FrameAxSnapshot>, AxViewError> {
        let trees = self
            .driver
            .ax_trees()
            .await
            .map_err(|err| AxViewError::ExtractionFailed(err.to_string()))?;
        Ok(trees
            .into_iter()
            .map(|(frame_id, nodes)| FrameAxSnapshot { frame_id, nodes })
            .collect())
    }

    async fn dom_documents(&self) -> Result<Vec<FrameDomSnapshot>, AxViewError> {
        let documents = self
            .driver
            .dom_documents()
            .await
            .map_err(|err| AxViewError::ExtractionFailed(err.to_string()))?;
        Ok(documents
            .into_iter()
            .map(|(frame_id, root)| FrameDomSnapshot { frame_id, root })
            .collect())
    }

    async fn resolve_scope(&self, selector: &str) -> Result<Option<u64>, AxViewError> {
        self.driver
            .resolve_css_backend_id(selector)
            .await
            .map_err(|err| AxViewError::Internal(err.to_string()))
    }
}
