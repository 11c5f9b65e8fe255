// Business domains
pub mod access;
