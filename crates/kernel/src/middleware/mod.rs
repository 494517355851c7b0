//! HTTP middleware components.
//!
//! Provides the admission-control layer that runs in front of business
//! handlers, and the response annotation it produces.

pub mod admission;
pub mod response;

pub use admission::{AdmissionController, Verdict, enforce_admission};
pub use response::{annotate_response, rejection_response};
