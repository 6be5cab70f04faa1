//! Projection change events and listener bookkeeping.
//!
//! Listeners run inline and receive the projection mutably, so they can add or remove ranges
//! while a change is being reported. Notifications are delivered one at a time: a
//! notification raised while listeners run is queued and dispatched after the current one has
//! reached every listener. No listener is ever re-entered, and all listeners observe the same
//! order.

use std::collections::VecDeque;

use crate::document::ProjectionDocument;
use crate::intervals::Region;
use crate::master::{DocumentEvent, MasterDocument};

/// What a [`ProjectionEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Master text inside the projection was edited.
    ContentChange,
    /// The set of projected master ranges changed.
    ProjectionChange,
}

/// Whether a notification precedes or follows the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    /// The change has not been applied to the projection yet.
    AboutToChange,
    /// The change has been applied.
    Changed,
}

/// A change of the projection text, in projection coordinates, with its master origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionEvent {
    /// Change type
    pub kind: ChangeKind,
    /// Start of the replaced projection range.
    pub image_offset: usize,
    /// Length of the replaced projection range.
    pub image_length: usize,
    /// Replacement text.
    pub text: String,
    /// Master offset the change originates from.
    pub origin_offset: usize,
    /// Master length the change originates from.
    pub origin_length: usize,
    /// The master edit that caused the change, if any.
    pub master_event: Option<DocumentEvent>,
}

impl ProjectionEvent {
    pub(crate) fn content(image: Region, text: &str, origin: Region) -> Self {
        Self {
            kind: ChangeKind::ContentChange,
            image_offset: image.offset,
            image_length: image.length,
            text: text.to_string(),
            origin_offset: origin.offset,
            origin_length: origin.length,
            master_event: None,
        }
    }

    pub(crate) fn projection(image: Region, text: String, origin: Region) -> Self {
        Self {
            kind: ChangeKind::ProjectionChange,
            image_offset: image.offset,
            image_length: image.length,
            text,
            origin_offset: origin.offset,
            origin_length: origin.length,
            master_event: None,
        }
    }

    pub(crate) fn with_master_event(mut self, event: Option<&DocumentEvent>) -> Self {
        self.master_event = event.cloned();
        self
    }

    /// The replaced projection range.
    pub fn image_region(&self) -> Region {
        Region::new(self.image_offset, self.image_length)
    }

    /// The originating master range.
    pub fn origin_region(&self) -> Region {
        Region::new(self.origin_offset, self.origin_length)
    }
}

/// Callback invoked for every projection change, once per phase.
pub type ProjectionListener = Box<
    dyn FnMut(&mut ProjectionDocument, &MasterDocument, EventPhase, &ProjectionEvent) + Send,
>;

/// Identifier of a subscribed listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Who initiated the master edit currently in flight.
#[derive(Debug, Clone, Default)]
pub(crate) enum EditState {
    /// Master edits come from outside and are translated on arrival.
    #[default]
    Idle,
    /// The projection is forwarding one of its own edits to the master; `original` is the
    /// projection-side description, consumed by the matching master notification.
    SelfUpdating { original: Option<ProjectionEvent> },
}

/// A master change that was announced but not yet confirmed.
#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    pub(crate) master_event: DocumentEvent,
    /// `None` if the change is invisible in the projection.
    pub(crate) image_event: Option<ProjectionEvent>,
}

struct ListenerSlot {
    id: ListenerId,
    /// `None` while the listener is running.
    callback: Option<ProjectionListener>,
}

#[derive(Default)]
pub(crate) struct ListenerSlots {
    slots: Vec<ListenerSlot>,
    next_id: u64,
    queue: VecDeque<(EventPhase, ProjectionEvent)>,
    dispatching: bool,
}

impl std::fmt::Debug for ListenerSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSlots")
            .field("count", &self.slots.len())
            .field("queued", &self.queue.len())
            .field("dispatching", &self.dispatching)
            .finish()
    }
}

impl ListenerSlots {
    pub(crate) fn add(&mut self, callback: ProjectionListener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.slots.push(ListenerSlot {
            id,
            callback: Some(callback),
        });
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.id != id);
        self.slots.len() != before
    }

    /// Drop every listener and every undelivered notification.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.queue.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot of the subscribed ids, in subscription order.
    pub(crate) fn ids(&self) -> Vec<ListenerId> {
        self.slots.iter().map(|slot| slot.id).collect()
    }

    fn slot_mut(&mut self, id: ListenerId) -> Option<&mut ListenerSlot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }

    /// Take the callback out of its slot for the duration of a call.
    pub(crate) fn checkout(&mut self, id: ListenerId) -> Option<ProjectionListener> {
        self.slot_mut(id)?.callback.take()
    }

    /// Put a callback back. Dropped if the listener was removed meanwhile.
    pub(crate) fn checkin(&mut self, id: ListenerId, callback: ProjectionListener) {
        if let Some(slot) = self.slot_mut(id) {
            slot.callback = Some(callback);
        }
    }

    /// Queue a notification. Returns `true` if the caller must dispatch the queue, `false` if
    /// a dispatch is already running further up the stack.
    pub(crate) fn post(&mut self, phase: EventPhase, event: ProjectionEvent) -> bool {
        self.queue.push_back((phase, event));
        !std::mem::replace(&mut self.dispatching, true)
    }

    pub(crate) fn next_event(&mut self) -> Option<(EventPhase, ProjectionEvent)> {
        self.queue.pop_front()
    }

    pub(crate) fn finish_dispatch(&mut self) {
        self.dispatching = false;
    }
}
