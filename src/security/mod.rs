//! Security checks applied before loading code from outside the
//! project's dependency directory.

pub mod path;

pub use path::{contained_path, relative_path, SafePath};
