//! One master document shared by many projections.
//!
//! [`ProjectionManager`] owns the [`MasterDocument`] and every [`ProjectionDocument`] cut
//! from it. Master edits made through the manager are broadcast: every projection is told
//! about the edit before it is committed and after. Projection-side edits are forwarded to
//! the master the same way, with the originating projection marked as self-updating.

use std::collections::BTreeMap;

use crate::config::ProjectionConfig;
use crate::document::ProjectionDocument;
use crate::error::ProjectionError;
use crate::events::{EventPhase, ListenerId, ProjectionEvent};
use crate::intervals::Region;
use crate::master::{DocumentEvent, MasterDocument};

/// Opaque identifier for a projection in a [`ProjectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectionId(u64);

impl ProjectionId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Owner of a master document and its projections.
#[derive(Debug, Default)]
pub struct ProjectionManager {
    master: MasterDocument,
    projections: BTreeMap<ProjectionId, ProjectionDocument>,
    next_projection_id: u64,
}

impl ProjectionManager {
    /// Create a manager over a master document holding `text`.
    pub fn new(text: &str) -> Self {
        Self::with_master(MasterDocument::new(text))
    }

    /// Create a manager over an existing master document.
    pub fn with_master(master: MasterDocument) -> Self {
        Self {
            master,
            projections: BTreeMap::new(),
            next_projection_id: 0,
        }
    }

    /// The master document.
    pub fn master(&self) -> &MasterDocument {
        &self.master
    }

    /// Number of live projections.
    pub fn len(&self) -> usize {
        self.projections.len()
    }

    /// Check if there are no projections.
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }

    /// Ids of all live projections, in creation order.
    pub fn projection_ids(&self) -> Vec<ProjectionId> {
        self.projections.keys().copied().collect()
    }

    /// Look up a projection.
    pub fn projection(&self, id: ProjectionId) -> Option<&ProjectionDocument> {
        self.projections.get(&id)
    }

    /// Create an empty projection.
    pub fn create_projection(&mut self, config: ProjectionConfig) -> ProjectionId {
        let id = ProjectionId(self.next_projection_id);
        self.next_projection_id += 1;
        self.projections
            .insert(id, ProjectionDocument::with_config(config));
        tracing::debug!(projection = id.get(), "created projection");
        id
    }

    /// Create a projection showing the master range `[offset, offset + length)`.
    pub fn create_projection_of(
        &mut self,
        offset: usize,
        length: usize,
        config: ProjectionConfig,
    ) -> Result<ProjectionId, ProjectionError> {
        self.master.check_range(Region::new(offset, length))?;
        let id = self.create_projection(config);
        let (master, projection) = self.split(id)?;
        projection.replace_master_ranges(master, offset, length)?;
        Ok(id)
    }

    fn split(
        &mut self,
        id: ProjectionId,
    ) -> Result<(&MasterDocument, &mut ProjectionDocument), ProjectionError> {
        let projection = self
            .projections
            .get_mut(&id)
            .ok_or(ProjectionError::ProjectionNotFound(id))?;
        Ok((&self.master, projection))
    }

    /// See [`ProjectionDocument::add_master_range`].
    pub fn add_master_range(
        &mut self,
        id: ProjectionId,
        offset: usize,
        length: usize,
    ) -> Result<(), ProjectionError> {
        let (master, projection) = self.split(id)?;
        projection.add_master_range(master, offset, length)
    }

    /// See [`ProjectionDocument::remove_master_range`].
    pub fn remove_master_range(
        &mut self,
        id: ProjectionId,
        offset: usize,
        length: usize,
    ) -> Result<(), ProjectionError> {
        let (master, projection) = self.split(id)?;
        projection.remove_master_range(master, offset, length)
    }

    /// See [`ProjectionDocument::replace_master_ranges`].
    pub fn replace_master_ranges(
        &mut self,
        id: ProjectionId,
        offset: usize,
        length: usize,
    ) -> Result<(), ProjectionError> {
        let (master, projection) = self.split(id)?;
        projection.replace_master_ranges(master, offset, length)
    }

    /// Set a projection's auto-expansion mode.
    pub fn set_auto_expand(
        &mut self,
        id: ProjectionId,
        auto_expand: bool,
    ) -> Result<(), ProjectionError> {
        let (_, projection) = self.split(id)?;
        projection.set_auto_expand(auto_expand);
        Ok(())
    }

    /// Subscribe to a projection's changes.
    pub fn subscribe<F>(
        &mut self,
        id: ProjectionId,
        callback: F,
    ) -> Result<ListenerId, ProjectionError>
    where
        F: FnMut(&mut ProjectionDocument, &MasterDocument, EventPhase, &ProjectionEvent)
            + Send
            + 'static,
    {
        let (_, projection) = self.split(id)?;
        Ok(projection.subscribe(callback))
    }

    /// Remove a listener from a projection. Returns `false` if it was not subscribed.
    pub fn unsubscribe(
        &mut self,
        id: ProjectionId,
        listener: ListenerId,
    ) -> Result<bool, ProjectionError> {
        let (_, projection) = self.split(id)?;
        Ok(projection.unsubscribe(listener))
    }

    /// Dispose a projection and forget it.
    pub fn dispose(&mut self, id: ProjectionId) -> Result<(), ProjectionError> {
        let mut projection = self
            .projections
            .remove(&id)
            .ok_or(ProjectionError::ProjectionNotFound(id))?;
        projection.dispose();
        tracing::debug!(projection = id.get(), "disposed projection");
        Ok(())
    }

    /// Replace master text and update every projection.
    pub fn replace_master(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<(), ProjectionError> {
        let event = self.master.prepare_replace(offset, length, text)?;
        self.broadcast(&event)
    }

    /// Replace the whole master text.
    pub fn set_master(&mut self, text: &str) -> Result<(), ProjectionError> {
        let length = self.master.len();
        self.replace_master(0, length, text)
    }

    /// Replace the range `[offset, offset + length)` of a projection with `text`.
    ///
    /// The edit is applied to the master and reaches every other projection as a regular
    /// master edit.
    pub fn replace(
        &mut self,
        id: ProjectionId,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<(), ProjectionError> {
        let (_, projection) = self.split(id)?;
        let origin = projection.begin_self_update(Region::new(offset, length), text)?;

        let result = self
            .master
            .prepare_replace(origin.offset, origin.length, text)
            .and_then(|event| self.broadcast(&event));

        if let Some(projection) = self.projections.get_mut(&id) {
            projection.end_self_update();
        }
        result
    }

    /// Replace the whole text of a projection.
    pub fn set(&mut self, id: ProjectionId, text: &str) -> Result<(), ProjectionError> {
        let length = self
            .projection(id)
            .ok_or(ProjectionError::ProjectionNotFound(id))?
            .len();
        self.replace(id, 0, length, text)
    }

    /// Announce, commit and confirm a prepared master edit.
    ///
    /// Projections already broken by an earlier consistency violation are skipped. The first
    /// error reported by a projection is returned once the edit has reached all of them.
    fn broadcast(&mut self, event: &DocumentEvent) -> Result<(), ProjectionError> {
        tracing::debug!(
            edit = event.id.get(),
            offset = event.offset,
            length = event.length,
            projections = self.projections.len(),
            "broadcasting master edit"
        );

        let mut first_error = None;
        for projection in self.projections.values_mut() {
            if projection.is_broken() {
                continue;
            }
            if let Err(err) = projection.master_about_to_change(&self.master, event) {
                first_error.get_or_insert(err);
            }
        }

        self.master.commit(event)?;

        for projection in self.projections.values_mut() {
            if projection.is_broken() {
                continue;
            }
            if let Err(err) = projection.master_changed(&self.master, event) {
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
