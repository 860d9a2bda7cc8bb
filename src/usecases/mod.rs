pub mod compute_allocations;
pub mod refresh_service;
pub mod valuation;
