pub mod address;
pub mod costs;
pub mod geocode;
pub mod legal;
pub mod market;
pub mod ocr;
pub mod session;
pub mod simulation;
pub mod zoning;
