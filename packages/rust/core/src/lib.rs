//! Plan-application engine for Tidymarks.
//!
//! This crate ties together tree flattening, plan requests, validation,
//! folder materialization, and bookmark placement into the end-to-end
//! workflows `preview` and `organize`.

pub mod flatten;
pub mod pipeline;
pub mod preview;
pub mod report;
pub mod validate;

mod context;
mod materialize;
mod place;

pub use context::ResolutionTable;
pub use flatten::{TreeSnapshot, domain_of, flatten};
pub use pipeline::{
    ApplyOptions, ObtainedPlan, OrganizeOutcome, OrganizeProgress, OrganizeRequest, PlanSource,
    PreviewOutcome, SilentProgress, apply_plan, organize, preview, read_snapshot, request_plan,
};
pub use preview::{Preview, PreviewBookmark, PreviewFolder, build_preview};
pub use report::{OrganizeResponse, PreviewResponse, RunIssue, RunReport};
pub use validate::{ValidationReport, validate_plan};
