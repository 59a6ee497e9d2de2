//! Shared type definitions for the cean form framework.
//!
//! This crate holds everything that crosses a crate boundary: widget keys,
//! update-bus messages, the backend wire envelope with its typed method table,
//! and the small data models (choices, persons, relationships) that widgets
//! publish as values.

mod key;
mod models;
mod update;
pub mod wire;

pub use key::{KeyAllocator, WidgetKey};
pub use models::{Choice, FieldError, MetadataEntry, Person, Relationship, Technique, TechniqueCatalog};
pub use update::{UpdateCause, UpdateMessage};
pub use wire::{BackendMethod, Envelope, Method, UnknownMethod};
