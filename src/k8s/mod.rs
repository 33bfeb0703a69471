//! Kubernetes integration module.
//!
//! This module provides the uninitialized-pod watch loop that drives the
//! controller: a list/watch adapter that opts into uninitialized-object
//! visibility, the minimal pod data model carrying the alpha
//! `metadata.initializers` field, and the reconciliation handler that claims
//! the controller's pending-initializer entry.
//!
//! The main components are:
//! - [`VfioInitializer`]: watches pod additions and removes the claimed
//!   initializer entry
//! - [`UninitializedListWatch`]: builds list/watch requests with
//!   `includeUninitialized=true` forced on
//! - [`WatchedPod`]: pod snapshot with the pending-initializers list

pub(crate) mod initializer;
pub(crate) mod list_watch;
pub(crate) mod pod;
pub(crate) mod types;

pub(crate) use initializer::VfioInitializer;
pub(crate) use list_watch::UninitializedListWatch;
pub(crate) use pod::WatchedPod;
