#![warn(missing_docs)]
//! Editor Core Projection - filtered views over a master text buffer
//!
//! # Overview
//!
//! A *projection* is a derived text buffer made of selected, disjoint ranges ("fragments")
//! of a *master* document, concatenated in master order. Folding views, embedded-language
//! regions and "show only this function" editors are all projections.
//!
//! Edits flow both ways: master edits are tracked into every projection cut from the master,
//! and edits made on a projection are translated into master edits. Listeners of a projection
//! see a before/after notification pair for every change, in projection coordinates.
//!
//! All offsets are character offsets (Unicode scalar values); ranges are half-open.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  ProjectionManager (one master, n views)    │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  ProjectionDocument (ranges, edit routing)  │  ← Orchestration
//! ├─────────────────────────────────────────────┤
//! │  Events & Listeners (before / after)        │  ← Notification
//! ├─────────────────────────────────────────────┤
//! │  ProjectionMapping (origin <-> image)       │  ← Coordinates
//! ├─────────────────────────────────────────────┤
//! │  SegmentRegistry (fragment/segment pairs)   │  ← Structure
//! ├─────────────────────────────────────────────┤
//! │  Intervals & IntervalTracker                │  ← Edit Tracking
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_core_projection::{ProjectionConfig, ProjectionManager};
//!
//! let mut manager = ProjectionManager::new("ABCDEFGHIJ");
//! let id = manager.create_projection(ProjectionConfig::default());
//!
//! manager.add_master_range(id, 2, 3).unwrap();
//! manager.add_master_range(id, 7, 2).unwrap();
//! assert_eq!(manager.projection(id).unwrap().text(), "CDEHI");
//!
//! // Closing the gap merges both fragments.
//! manager.add_master_range(id, 5, 2).unwrap();
//! assert_eq!(manager.projection(id).unwrap().text(), "CDEFGHI");
//!
//! // Editing the projection edits the master.
//! manager.replace(id, 0, 1, "c").unwrap();
//! assert_eq!(manager.master().text(), "ABcDEFGHIJ");
//! ```
//!
//! # Module Description
//!
//! - [`intervals`] - intervals and their adjustment under edits
//! - [`registry`] - offset-sorted fragment/segment pairs
//! - [`mapping`] - origin/image coordinate translation
//! - [`events`] - projection events and listener bookkeeping
//! - [`document`] - the projection document
//! - [`master`] - the rope-backed master document
//! - [`manager`] - one master shared by many projections
//! - [`config`] - projection options
//! - [`error`] - error type

pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod intervals;
pub mod manager;
pub mod mapping;
pub mod master;
pub mod registry;

pub use config::{ProjectionConfig, SafetyLimit};
pub use document::ProjectionDocument;
pub use error::ProjectionError;
pub use events::{ChangeKind, EventPhase, ListenerId, ProjectionEvent, ProjectionListener};
pub use intervals::{Interval, IntervalTracker, Region, TextEdit, Trailing};
pub use manager::{ProjectionId, ProjectionManager};
pub use mapping::ProjectionMapping;
pub use master::{DocumentEvent, EditId, MasterDocument};
pub use registry::{Pair, SegmentRegistry};
