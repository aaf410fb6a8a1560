//! Common types used throughout the deployment pipeline, shared between the
//! deploy scripts and any downstream consumers of deployment records.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod constants;
pub mod types;
