//! Projection document: a derived text buffer made of selected master ranges.
//!
//! A [`ProjectionDocument`] does not own its master. Every operation that needs master text
//! takes the [`MasterDocument`] as an argument; master edits reach the projection as an
//! announce/confirm pair ([`master_about_to_change`](ProjectionDocument::master_about_to_change)
//! and [`master_changed`](ProjectionDocument::master_changed)), normally routed by a
//! [`ProjectionManager`](crate::ProjectionManager).
//!
//! # Change routing
//!
//! ```text
//!   external master edit                      projection-side edit
//!           |                                          |
//!           v                                          v
//!   about_to_change: expand, translate        begin_self_update: map image -> origin
//!           |                                          |
//!           +------------> pending change <------------+
//!                               |
//!   changed:  notify (before) -> track fragments -> normalize -> patch text -> notify (after)
//! ```
//!
//! The before-notification of a content change is held back until the master confirms the
//! edit, so listeners never observe an edit that was announced and then abandoned.
//!
//! A range change becomes binding once its before-notification is out. If a listener starts
//! another range change while it is being notified, the announced change is applied first,
//! and the nested change is planned against the result. Every before-notification is therefore
//! followed by an after-notification carrying the same event.

use ropey::Rope;

use crate::config::ProjectionConfig;
use crate::error::ProjectionError;
use crate::events::{
    EditState, EventPhase, ListenerId, ListenerSlots, PendingChange, ProjectionEvent,
    ProjectionListener,
};
use crate::intervals::{Interval, IntervalTracker, Region, Trailing};
use crate::mapping::ProjectionMapping;
use crate::master::{DocumentEvent, MasterDocument};
use crate::registry::{Pair, SegmentRegistry};

#[derive(Debug, Clone, Copy)]
enum AddPlan {
    /// The gap closes the hole between the pair at `left` and its right neighbor.
    Bridge { left: usize },
    /// The pair at `left` ends where the gap starts.
    ExtendLeft { left: usize },
    /// The pair at `right` starts where the gap ends.
    ExtendRight { right: usize },
    /// No neighbor touches the gap.
    Insert { index: usize },
}

#[derive(Debug)]
struct AddStep {
    plan: AddPlan,
    gap: Region,
    event: ProjectionEvent,
}

#[derive(Debug)]
struct RemoveStep {
    index: usize,
    region: Region,
    event: ProjectionEvent,
}

/// A range change whose before-notification has been sent but which is not applied yet.
#[derive(Debug)]
enum Announced {
    Add(AddStep),
    Remove(RemoveStep),
    Reset { region: Region, event: ProjectionEvent },
}

impl Announced {
    fn event(&self) -> &ProjectionEvent {
        match self {
            Announced::Add(step) => &step.event,
            Announced::Remove(step) => &step.event,
            Announced::Reset { event, .. } => event,
        }
    }
}

/// A filtered view of a master document.
///
/// The projection text is always the concatenation, in master order, of the master text
/// under its fragments.
#[derive(Debug, Default)]
pub struct ProjectionDocument {
    registry: SegmentRegistry,
    content: Rope,
    config: ProjectionConfig,
    state: EditState,
    pending: Option<PendingChange>,
    announced: Option<Announced>,
    listeners: ListenerSlots,
    disposed: bool,
    broken: bool,
}

impl ProjectionDocument {
    /// Create an empty projection with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty projection.
    pub fn with_config(config: ProjectionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Projection text.
    pub fn text(&self) -> String {
        self.content.to_string()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.content.len_chars()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.content.len_chars() == 0
    }

    /// Text of the projection range `[offset, offset + length)`.
    pub fn get(&self, offset: usize, length: usize) -> Result<String, ProjectionError> {
        let region = Region::new(offset, length);
        self.check_image_range(region)?;
        Ok(self.content.slice(region.range()).to_string())
    }

    /// Number of lines (an empty projection has one line).
    pub fn line_count(&self) -> usize {
        self.content.len_lines()
    }

    /// Line containing the projection offset.
    pub fn line_of_offset(&self, offset: usize) -> Result<usize, ProjectionError> {
        self.check_image_range(Region::new(offset, 0))?;
        Ok(self.content.char_to_line(offset))
    }

    /// Projected master ranges, in order.
    pub fn fragments(&self) -> Vec<Region> {
        self.registry
            .pairs()
            .iter()
            .map(|pair| pair.fragment().region())
            .collect()
    }

    /// Projection ranges of the fragments, in order.
    pub fn segments(&self) -> Vec<Region> {
        self.registry
            .pairs()
            .iter()
            .map(|pair| pair.segment().region())
            .collect()
    }

    /// Fragment/segment pairs.
    pub fn pairs(&self) -> &[Pair] {
        self.registry.pairs()
    }

    /// Coordinate translation over the current fragments.
    pub fn mapping(&self) -> ProjectionMapping<'_> {
        ProjectionMapping::new(&self.registry)
    }

    /// Current configuration.
    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Whether master edits that remove text expand the projection.
    pub fn is_auto_expanding(&self) -> bool {
        self.config.auto_expand
    }

    /// Set the auto-expansion mode.
    pub fn set_auto_expand(&mut self, auto_expand: bool) {
        self.config.auto_expand = auto_expand;
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether an internal consistency violation was detected.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Sub-ranges of a master range that are not projected.
    pub fn unprojected_master_regions(
        &self,
        master: &MasterDocument,
        offset: usize,
        length: usize,
    ) -> Result<Vec<Region>, ProjectionError> {
        self.ensure_live()?;
        let region = Region::new(offset, length);
        master.check_range(region)?;
        Ok(self.mapping().unprojected_master_regions(region))
    }

    /// Sub-ranges of a master range that are projected, or `None` if there are none.
    pub fn projected_master_regions(
        &self,
        master: &MasterDocument,
        offset: usize,
        length: usize,
    ) -> Result<Option<Vec<Region>>, ProjectionError> {
        self.ensure_live()?;
        let region = Region::new(offset, length);
        master.check_range(region)?;
        let mapping = self.mapping();
        Ok(mapping
            .to_closest_image(region)
            .and_then(|image| mapping.to_origin(image)))
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Subscribe to projection changes. Every change is reported twice: before and after it
    /// is applied.
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&mut ProjectionDocument, &MasterDocument, EventPhase, &ProjectionEvent)
            + Send
            + 'static,
    {
        let listener: ProjectionListener = Box::new(callback);
        self.listeners.add(listener)
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn fire(&mut self, master: &MasterDocument, phase: EventPhase, event: &ProjectionEvent) {
        if self.listeners.is_empty() || !self.listeners.post(phase, event.clone()) {
            return;
        }
        while let Some((phase, event)) = self.listeners.next_event() {
            for id in self.listeners.ids() {
                let Some(mut callback) = self.listeners.checkout(id) else {
                    continue;
                };
                callback(self, master, phase, &event);
                self.listeners.checkin(id, callback);
            }
        }
        self.listeners.finish_dispatch();
    }

    /// Send the before-notification of a range change, then apply it.
    fn announce(
        &mut self,
        master: &MasterDocument,
        announced: Announced,
    ) -> Result<(), ProjectionError> {
        let event = announced.event().clone();
        self.announced = Some(announced);
        self.fire(master, EventPhase::AboutToChange, &event);
        if let Err(err) = self.ensure_live() {
            self.announced = None;
            return Err(err);
        }
        self.settle_announced(master)
    }

    /// Apply the announced range change, if any, and send its after-notification.
    ///
    /// Runs before every structural operation, so a listener that changes the projection
    /// while being told about a change sees that change applied.
    fn settle_announced(&mut self, master: &MasterDocument) -> Result<(), ProjectionError> {
        let Some(announced) = self.announced.take() else {
            return Ok(());
        };
        match &announced {
            Announced::Add(step) => {
                self.apply_add(step)?;
                self.normalize(Some(step.gap.offset))?;
            }
            Announced::Remove(step) => {
                self.apply_remove(step)?;
                self.normalize(Some(step.region.offset))?;
            }
            Announced::Reset { region, event } => self.apply_reset(*region, &event.text),
        }
        self.check_consistency()?;
        self.fire(master, EventPhase::Changed, announced.event());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Range management
    // ------------------------------------------------------------------

    /// Make the master range `[offset, offset + length)` part of the projection.
    ///
    /// Already projected parts are left alone; neighboring fragments are extended or merged.
    /// Listeners may change the projection while the range is being added, so the unprojected
    /// remainder is recomputed after every step; the number of steps is bounded by the
    /// configured [`SafetyLimit`](crate::SafetyLimit).
    ///
    /// Called from a listener, this first applies the change the listener is being notified
    /// about.
    pub fn add_master_range(
        &mut self,
        master: &MasterDocument,
        offset: usize,
        length: usize,
    ) -> Result<(), ProjectionError> {
        self.check_usable()?;
        let region = Region::new(offset, length);
        master.check_range(region)?;
        let result = self
            .settle_announced(master)
            .and_then(|()| self.add_range_with(master, region, None));
        self.track(result)
    }

    /// Remove the master range `[offset, offset + length)` from the projection.
    ///
    /// The range must lie inside a single fragment; anything else is rejected with
    /// [`ProjectionError::NotProjected`] and leaves the projection untouched.
    pub fn remove_master_range(
        &mut self,
        master: &MasterDocument,
        offset: usize,
        length: usize,
    ) -> Result<(), ProjectionError> {
        self.check_usable()?;
        let region = Region::new(offset, length);
        master.check_range(region)?;
        let result = self
            .settle_announced(master)
            .and_then(|()| self.remove_range(master, region));
        self.track(result)
    }

    /// Replace all fragments with the single master range `[offset, offset + length)`.
    pub fn replace_master_ranges(
        &mut self,
        master: &MasterDocument,
        offset: usize,
        length: usize,
    ) -> Result<(), ProjectionError> {
        self.check_usable()?;
        let region = Region::new(offset, length);
        master.check_range(region)?;
        let result = self
            .settle_announced(master)
            .and_then(|()| self.reset_to(master, region));
        self.track(result)
    }

    fn add_range_with(
        &mut self,
        master: &MasterDocument,
        region: Region,
        master_event: Option<&DocumentEvent>,
    ) -> Result<(), ProjectionError> {
        let limit = self.config.safety_limit.for_fragments(self.registry.len());
        for _ in 0..=limit {
            let Some(gap) = self.mapping().first_unprojected_master_region(region) else {
                return Ok(());
            };
            self.internal_add(master, gap, master_event)?;
        }

        tracing::warn!(
            offset = region.offset,
            length = region.length,
            limit,
            "range addition did not settle"
        );
        Err(ProjectionError::SafetyLimitExceeded { limit })
    }

    fn plan_add(
        &self,
        master: &MasterDocument,
        gap: Region,
        master_event: Option<&DocumentEvent>,
    ) -> Result<AddStep, ProjectionError> {
        let overlap = || ProjectionError::OverlapsFragment {
            offset: gap.offset,
            length: gap.length,
        };
        let pairs = self.registry.pairs();
        let index = self.registry.index_at(gap.offset);
        let mut left = None;
        let mut right = None;

        if let Some(pair) = pairs.get(index) {
            let fragment = pair.fragment;
            if fragment.offset == gap.offset {
                if fragment.length != 0 {
                    return Err(overlap());
                }
                left = Some(index);
            } else if fragment.length != 0 && fragment.offset < gap.end() {
                return Err(overlap());
            }
            if fragment.offset == gap.end() {
                right = Some(index);
            }
        }

        if index > 0 {
            let fragment = pairs[index - 1].fragment;
            if fragment.includes(gap.offset) {
                return Err(overlap());
            }
            if fragment.end() == gap.offset {
                left = Some(index - 1);
            }
        }

        let plan = match (left, right) {
            (Some(left), Some(_)) => AddPlan::Bridge { left },
            (Some(left), None) => AddPlan::ExtendLeft { left },
            (None, Some(right)) => AddPlan::ExtendRight { right },
            (None, None) => AddPlan::Insert { index },
        };
        let image_offset = index
            .checked_sub(1)
            .map_or(0, |prev| pairs[prev].segment.end());
        let event =
            ProjectionEvent::projection(Region::new(image_offset, 0), master.get(gap)?, gap)
                .with_master_event(master_event);

        Ok(AddStep { plan, gap, event })
    }

    fn internal_add(
        &mut self,
        master: &MasterDocument,
        gap: Region,
        master_event: Option<&DocumentEvent>,
    ) -> Result<(), ProjectionError> {
        let step = self.plan_add(master, gap, master_event)?;
        tracing::debug!(
            offset = gap.offset,
            length = gap.length,
            plan = ?step.plan,
            "projecting master range"
        );
        self.announce(master, Announced::Add(step))
    }

    fn apply_add(&mut self, step: &AddStep) -> Result<(), ProjectionError> {
        let gap = step.gap;
        match step.plan {
            AddPlan::Bridge { left } => self.registry.merge(left)?,
            AddPlan::ExtendLeft { left } => {
                let fragment = &mut self.pair_mut(left)?.fragment;
                fragment.length = gap.end() - fragment.offset;
            }
            AddPlan::ExtendRight { right } => {
                let fragment = &mut self.pair_mut(right)?.fragment;
                fragment.offset = gap.offset;
                fragment.length += gap.length;
            }
            AddPlan::Insert { index } => {
                self.registry
                    .create_pair(Interval::new(gap.offset, gap.length), index);
            }
        }
        self.registry.relayout();

        let image_offset = step.event.image_offset;
        if image_offset > self.content.len_chars() {
            return Err(ProjectionError::internal(format!(
                "insertion point {image_offset} beyond projection end"
            )));
        }
        self.content.insert(image_offset, &step.event.text);
        Ok(())
    }

    fn plan_remove(&self, region: Region) -> Result<RemoveStep, ProjectionError> {
        let not_projected = || ProjectionError::NotProjected {
            offset: region.offset,
            length: region.length,
        };
        let image = self.mapping().to_image(region).ok_or_else(not_projected)?;
        let index = self
            .registry
            .pairs()
            .iter()
            .position(|pair| {
                pair.fragment.offset <= region.offset && region.end() <= pair.fragment.end()
            })
            .ok_or_else(not_projected)?;

        Ok(RemoveStep {
            index,
            region,
            event: ProjectionEvent::projection(image, String::new(), region),
        })
    }

    fn remove_range(
        &mut self,
        master: &MasterDocument,
        region: Region,
    ) -> Result<(), ProjectionError> {
        if region.is_empty() {
            return Ok(());
        }

        let step = self.plan_remove(region)?;
        tracing::debug!(
            offset = region.offset,
            length = region.length,
            "removing master range"
        );
        self.announce(master, Announced::Remove(step))
    }

    fn apply_remove(&mut self, step: &RemoveStep) -> Result<(), ProjectionError> {
        let region = step.region;
        let fragment = self
            .registry
            .pairs()
            .get(step.index)
            .map(|pair| pair.fragment)
            .ok_or_else(|| ProjectionError::internal("removal target vanished"))?;

        if fragment.offset == region.offset {
            let head = &mut self.pair_mut(step.index)?.fragment;
            head.offset = region.end();
            head.length -= region.length;
        } else {
            // Split into left remainder, removed middle and right remainder.
            self.pair_mut(step.index)?.fragment.length = region.offset - fragment.offset;
            let mut middle = Interval::new(region.offset, region.length);
            middle.mark_deleted();
            self.registry.create_pair(middle, step.index + 1);
            self.registry.create_pair(
                Interval::new(region.end(), fragment.end() - region.end()),
                step.index + 2,
            );
        }
        self.registry.relayout();

        let image = step.event.image_region();
        if image.end() > self.content.len_chars() {
            return Err(ProjectionError::internal(format!(
                "removed range {}..{} beyond projection end",
                image.offset,
                image.end()
            )));
        }
        self.content.remove(image.range());
        Ok(())
    }

    fn reset_to(
        &mut self,
        master: &MasterDocument,
        region: Region,
    ) -> Result<(), ProjectionError> {
        let event =
            ProjectionEvent::projection(Region::new(0, self.len()), master.get(region)?, region);
        tracing::debug!(
            offset = region.offset,
            length = region.length,
            "replacing all master ranges"
        );
        self.announce(master, Announced::Reset { region, event })
    }

    fn apply_reset(&mut self, region: Region, text: &str) {
        self.registry.clear();
        self.registry
            .create_pair(Interval::new(region.offset, region.length), 0);
        self.registry.relayout();
        self.content = Rope::from_str(text);
    }

    /// Restore the well-formed segmentation after a mutation.
    ///
    /// Drops deleted pairs and empty pairs (one empty pair survives if nothing else is left),
    /// then merges pairs whose fragments touch. If the pass emptied the registry and `anchor`
    /// is given, a single empty pair is placed at the anchor.
    fn normalize(&mut self, anchor: Option<usize>) -> Result<bool, ProjectionError> {
        let mut changed = false;
        let keep_one_empty = !self
            .registry
            .pairs()
            .iter()
            .any(|pair| !pair.is_deleted() && pair.fragment.length > 0);
        let mut kept_empty = false;

        let mut index = 0;
        while index < self.registry.len() {
            let pair = &self.registry.pairs()[index];
            let discard = if pair.is_deleted() {
                true
            } else if pair.fragment.length == 0 {
                let keep = keep_one_empty && !kept_empty;
                kept_empty |= keep;
                !keep
            } else {
                false
            };

            if discard {
                let removed = self.registry.remove(index);
                tracing::trace!(
                    offset = removed.fragment.offset,
                    length = removed.fragment.length,
                    deleted = removed.is_deleted(),
                    "dropping fragment"
                );
                changed = true;
            } else {
                index += 1;
            }
        }

        let mut index = 0;
        while index + 1 < self.registry.len() {
            let pairs = self.registry.pairs();
            let (left, right) = (pairs[index].fragment, pairs[index + 1].fragment);
            if left.end() == right.offset {
                tracing::trace!(
                    left = left.offset,
                    right = right.offset,
                    "merging adjacent fragments"
                );
                self.registry.merge(index)?;
                changed = true;
            } else {
                index += 1;
            }
        }

        if changed
            && self.registry.is_empty()
            && let Some(anchor) = anchor
        {
            tracing::trace!(anchor, "anchoring empty projection");
            self.registry.create_pair(Interval::new(anchor, 0), 0);
        }

        self.registry.relayout();
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Master change routing
    // ------------------------------------------------------------------

    /// Announce a master edit that is about to be committed.
    ///
    /// Edits touching projected text first extend the projection over the replaced range,
    /// so the edit has an exact image. The projection's own listeners are not notified yet.
    pub fn master_about_to_change(
        &mut self,
        master: &MasterDocument,
        event: &DocumentEvent,
    ) -> Result<(), ProjectionError> {
        if self.disposed {
            return Ok(());
        }
        self.ensure_live()?;
        let result = self
            .settle_announced(master)
            .and_then(|()| self.prepare_master_change(master, event));
        self.track(result)
    }

    /// Confirm a committed master edit and bring the projection up to date.
    ///
    /// A confirmation without a matching announcement is absorbed by re-deriving the
    /// projection text from the master.
    pub fn master_changed(
        &mut self,
        master: &MasterDocument,
        event: &DocumentEvent,
    ) -> Result<(), ProjectionError> {
        if self.disposed {
            return Ok(());
        }
        self.ensure_live()?;
        let announced = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.master_event.id == event.id);
        let result = self.settle_announced(master).and_then(|()| {
            if announced {
                self.apply_master_change(master, event)
            } else {
                self.absorb_unannounced_change(master, event)
            }
        });
        self.track(result)
    }

    fn prepare_master_change(
        &mut self,
        master: &MasterDocument,
        event: &DocumentEvent,
    ) -> Result<(), ProjectionError> {
        if let Some(stale) = self.pending.take() {
            tracing::warn!(
                edit = stale.master_event.id.get(),
                "master change was announced but never confirmed"
            );
        }

        let self_updating = matches!(self.state, EditState::SelfUpdating { .. });
        let must_be_visible = self.adapt_to_master_change(master, event, self_updating)?;

        let image_event = if self_updating {
            let original = match &mut self.state {
                EditState::SelfUpdating { original } => original.take(),
                EditState::Idle => None,
            }
            .ok_or_else(|| ProjectionError::internal("self update without a projection edit"))?;
            Some(original.with_master_event(Some(event)))
        } else {
            self.mapping().to_image(event.region()).map(|image| {
                ProjectionEvent::content(image, &event.text, event.region())
                    .with_master_event(Some(event))
            })
        };
        if must_be_visible && image_event.is_none() {
            return Err(ProjectionError::internal(format!(
                "master change {}+{} has no exact image after expansion",
                event.offset, event.length
            )));
        }

        tracing::debug!(
            edit = event.id.get(),
            offset = event.offset,
            length = event.length,
            visible = image_event.is_some(),
            "master change announced"
        );
        self.pending = Some(PendingChange {
            master_event: event.clone(),
            image_event,
        });
        Ok(())
    }

    /// Returns `true` if the edit must be visible in the projection afterwards.
    fn adapt_to_master_change(
        &mut self,
        master: &MasterDocument,
        event: &DocumentEvent,
        self_updating: bool,
    ) -> Result<bool, ProjectionError> {
        let expand =
            self.affects_fragments(event) || (self.config.auto_expand && event.length > 0);
        if !self_updating && expand {
            self.add_range_with(master, event.region(), Some(event))?;
            return Ok(true);
        }

        if self.registry.is_empty() && event.length == 0 {
            tracing::debug!("creating an empty fragment for an empty projection");
            self.registry.create_pair(Interval::new(0, 0), 0);
            self.registry.relayout();
        }
        Ok(self_updating)
    }

    fn affects_fragments(&self, event: &DocumentEvent) -> bool {
        if !self.registry.fragments_overlapping(event.region()).is_empty() {
            return true;
        }
        // Typing right after the last fragment extends it.
        self.registry.pairs().last().is_some_and(|last| {
            last.fragment.offset < event.offset && last.fragment.end() == event.offset
        })
    }

    fn apply_master_change(
        &mut self,
        master: &MasterDocument,
        event: &DocumentEvent,
    ) -> Result<(), ProjectionError> {
        let image_event = self
            .pending
            .as_ref()
            .and_then(|pending| pending.image_event.clone());

        // Structural changes are refused while the pending change is still set.
        if let Some(image_event) = &image_event {
            self.fire(master, EventPhase::AboutToChange, image_event);
            if self.disposed {
                return Ok(());
            }
        }
        self.pending = None;

        self.track_fragments(event);
        self.normalize(Some(event.offset))?;

        if let Some(image_event) = &image_event {
            let image = image_event.image_region();
            if image.end() > self.content.len_chars() {
                return Err(ProjectionError::internal(format!(
                    "content change {}..{} beyond projection end",
                    image.offset,
                    image.end()
                )));
            }
            self.content.remove(image.range());
            self.content.insert(image.offset, &image_event.text);
        }
        self.check_consistency()?;

        if let Some(image_event) = &image_event {
            self.fire(master, EventPhase::Changed, image_event);
        }
        Ok(())
    }

    fn absorb_unannounced_change(
        &mut self,
        master: &MasterDocument,
        event: &DocumentEvent,
    ) -> Result<(), ProjectionError> {
        tracing::warn!(
            edit = event.id.get(),
            offset = event.offset,
            length = event.length,
            "master change was not announced, re-deriving projection"
        );
        self.pending = None;
        self.track_fragments(event);
        self.normalize(Some(event.offset))?;

        let text = self.derive_text(master)?;
        if self.content == text.as_str() {
            return self.check_consistency();
        }

        let change = ProjectionEvent::content(
            Region::new(0, self.len()),
            &text,
            self.covered_master_region(),
        )
        .with_master_event(Some(event));

        // Refuse structural changes while listeners look at the old text.
        self.pending = Some(PendingChange {
            master_event: event.clone(),
            image_event: None,
        });
        self.fire(master, EventPhase::AboutToChange, &change);
        self.pending = None;
        if self.disposed {
            return Ok(());
        }

        self.content = Rope::from_str(&text);
        self.check_consistency()?;
        self.fire(master, EventPhase::Changed, &change);
        Ok(())
    }

    fn track_fragments(&mut self, event: &DocumentEvent) {
        let tracker = IntervalTracker::new(event.as_text_edit(), Trailing::ExtendLast);
        tracker.adjust_all(self.registry.fragments_mut());
    }

    fn derive_text(&self, master: &MasterDocument) -> Result<String, ProjectionError> {
        let mut text = String::new();
        for pair in self.registry.pairs() {
            let fragment = master.get(pair.fragment.region()).map_err(|err| {
                ProjectionError::internal(format!("fragment outside master: {err}"))
            })?;
            text.push_str(&fragment);
        }
        Ok(text)
    }

    fn covered_master_region(&self) -> Region {
        let pairs = self.registry.pairs();
        match (pairs.first(), pairs.last()) {
            (Some(first), Some(last)) => {
                Region::from(first.fragment.offset..last.fragment.end())
            }
            _ => Region::default(),
        }
    }

    // ------------------------------------------------------------------
    // Projection-side edits
    // ------------------------------------------------------------------

    /// Start forwarding a projection edit to the master; returns the master range to replace.
    ///
    /// The master range runs from the origin of the first replaced character to the origin
    /// of the last one, so hidden master text between them is replaced as well.
    pub(crate) fn begin_self_update(
        &mut self,
        image: Region,
        text: &str,
    ) -> Result<Region, ProjectionError> {
        self.check_usable()?;
        self.check_image_range(image)?;

        let origin = if self.registry.is_empty() {
            Region::default()
        } else {
            self.mapping().to_origin_covering(image).ok_or_else(|| {
                ProjectionError::internal(format!(
                    "projection range {}+{} has no master origin",
                    image.offset, image.length
                ))
            })?
        };
        tracing::debug!(
            offset = image.offset,
            length = image.length,
            origin_offset = origin.offset,
            origin_length = origin.length,
            "forwarding projection edit"
        );
        self.state = EditState::SelfUpdating {
            original: Some(ProjectionEvent::content(image, text, origin)),
        };
        Ok(origin)
    }

    pub(crate) fn end_self_update(&mut self) {
        self.state = EditState::Idle;
        self.pending = None;
    }

    /// Replace master text and route the edit through this projection only.
    ///
    /// Use [`ProjectionManager`](crate::ProjectionManager) when several projections share
    /// the master.
    pub fn replace_master(
        &mut self,
        master: &mut MasterDocument,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<(), ProjectionError> {
        let event = master.prepare_replace(offset, length, text)?;
        self.master_about_to_change(master, &event)?;
        if let Err(err) = master.commit(&event) {
            self.pending = None;
            return Err(err);
        }
        self.master_changed(master, &event)
    }

    /// Replace the projection range `[offset, offset + length)` with `text`, editing the
    /// master accordingly.
    pub fn replace(
        &mut self,
        master: &mut MasterDocument,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<(), ProjectionError> {
        let origin = self.begin_self_update(Region::new(offset, length), text)?;
        let result = self.replace_master(master, origin.offset, origin.length, text);
        self.end_self_update();
        result
    }

    /// Replace the whole projection text.
    pub fn set(&mut self, master: &mut MasterDocument, text: &str) -> Result<(), ProjectionError> {
        let length = self.len();
        self.replace(master, 0, length, text)
    }

    // ------------------------------------------------------------------
    // Lifecycle and consistency
    // ------------------------------------------------------------------

    /// Detach the projection. Later operations fail with [`ProjectionError::Disposed`];
    /// master notifications are ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        tracing::debug!(fragments = self.registry.len(), "disposing projection");
        self.disposed = true;
        self.listeners.clear();
        self.registry.clear();
        self.content = Rope::new();
        self.pending = None;
        self.announced = None;
        self.state = EditState::Idle;
    }

    fn ensure_live(&self) -> Result<(), ProjectionError> {
        if self.disposed {
            return Err(ProjectionError::Disposed);
        }
        if self.broken {
            return Err(ProjectionError::internal(
                "projection is unusable after a consistency violation",
            ));
        }
        Ok(())
    }

    fn check_usable(&self) -> Result<(), ProjectionError> {
        self.ensure_live()?;
        if self.pending.is_some() {
            return Err(ProjectionError::ChangeInProgress);
        }
        Ok(())
    }

    fn check_image_range(&self, region: Region) -> Result<(), ProjectionError> {
        let document_length = self.len();
        if region.offset > document_length || region.length > document_length - region.offset
        {
            return Err(ProjectionError::BadLocation {
                offset: region.offset,
                length: region.length,
                document_length,
            });
        }
        Ok(())
    }

    fn check_consistency(&self) -> Result<(), ProjectionError> {
        self.registry.check_invariants()?;
        let image_length = self.registry.image_length();
        if self.content.len_chars() != image_length {
            return Err(ProjectionError::internal(format!(
                "projection text has {} characters, segments cover {image_length}",
                self.content.len_chars()
            )));
        }
        Ok(())
    }

    fn pair_mut(&mut self, index: usize) -> Result<&mut Pair, ProjectionError> {
        self.registry
            .pair_mut(index)
            .ok_or_else(|| ProjectionError::internal(format!("no pair at index {index}")))
    }

    fn track<T>(&mut self, result: Result<T, ProjectionError>) -> Result<T, ProjectionError> {
        if let Err(err) = &result
            && err.is_internal()
            && !self.broken
        {
            tracing::error!(error = %err, "projection is inconsistent");
            self.broken = true;
        }
        result
    }
}
