//! Core data models for the fragment store.
//!
//! `fragment` holds the entity and its error taxonomy; `types` holds the
//! table of accepted content types and their conversion families.

pub mod fragment;
pub mod types;
