//! mdrefs: a reference-intelligence Language Server Protocol implementation
//! for plain Markdown workspaces.
//!
//! # Overview
//!
//! mdrefs models a directory of Markdown documents and answers structural
//! queries over it:
//!
//! - **Workspace model**: per-document headings (with anchor slugs and
//!   section extents) and link occurrences, plus a workspace-wide reference
//!   index updated per document
//! - **Navigation**: go-to-definition and find-references across documents,
//!   headings, and reference-style definitions
//! - **Refactoring**: rename for headings, documents, and reference names,
//!   with every referencing link rewritten
//! - **Autocomplete**: path completion inside `[text](` and anchor
//!   completion after `#`
//! - **Diagnostics**: unresolved link and anchor mismatch detection
//!
//! # Architecture
//!
//! - [`workspace`]: the document store, parser, slugifier, resolver, and
//!   reference index
//! - [`completion`]: completion providers for link targets and reference
//!   names
//! - [`config`]: settings loading and defaults
//!
//! The feature modules ([`definition`], [`references`], [`rename`],
//! [`symbol`], [`folding`], [`diagnostics`]) are free functions over the
//! workspace; the `mdrefs` binary wires them to LSP requests.

// Core module - document store and reference index
pub mod workspace;

// LSP feature modules
pub mod completion;
pub mod definition;
pub mod diagnostics;
pub mod folding;
pub mod references;
pub mod rename;
pub mod symbol;

// Configuration
pub mod config;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
