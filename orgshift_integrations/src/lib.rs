//! Remote platform connectors for orgshift.

#![forbid(unsafe_code)]

pub mod connectors;

pub use connectors::salesforce::{SalesforceConfig, SalesforceRestClient};
