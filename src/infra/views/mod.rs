//! File-system backed view compilation and artifact cache.

mod cache;
mod engine;
pub mod markup;

pub use cache::{FsFileManager, FsViewCache};
pub use engine::FsViewEngine;
