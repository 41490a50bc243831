//! Client for the ITU OBS student portal: enrollment API, schedule pages and
//! the helpers that make sense of their answers.

pub mod branches;
pub mod client;
pub mod errors;
pub mod json;
pub mod models;
pub mod response;
pub mod schedule;

pub use branches::{BranchCatalog, BranchCatalogError};
pub use client::{DEFAULT_BASE_URL, ObsClient};
pub use errors::ObsApiError;
pub use models::{EnrollRequest, EnrollResponse};
pub use response::{EnrollOutcome, interpret_enroll_response};
pub use schedule::{SeatChecker, SeatInfo, SeatReport};
