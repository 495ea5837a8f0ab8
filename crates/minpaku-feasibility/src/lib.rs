//! Feasibility pipeline for short-term rental (minpaku) candidate
//! properties: flyer OCR, geocoding, zoning lookup, legal determination,
//! market pricing, cost estimation and a cashflow simulation, driven per
//! user through a [`workflows::session::FeasibilitySession`].

pub mod config;
pub mod error;
pub mod oracle;
pub mod telemetry;
pub mod workflows;
