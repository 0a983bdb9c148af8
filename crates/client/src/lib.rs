//! Client for the content-sources upload API.
//!
//! [`UploadApi`] is the seam the upload pipeline talks to; [`Client`] is the
//! reqwest implementation used against a real server, tests plug in mocks.

pub mod api;
pub mod client;

pub use api::{ApiFuture, UploadApi};
pub use client::{ApiError, Client};
