//! Application services and the collaborator seams they depend on.

pub mod access;
pub mod error;
pub mod pieces;
pub mod repos;
pub mod views;
