// src/db/models/mod.rs

//! Data models for reposync database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

mod package;
mod repository;

pub use package::{PackageRecord, VersionRecord};
pub use repository::{IndexState, MirrorKind, Repository};
