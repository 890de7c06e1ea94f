//! Hierarchical entry store.
//!
//! # Data Flow
//! ```text
//! URL path / metadata name
//!     → path.rs (EntryPath: child, parent, dir/file views, pure)
//!     → entry.rs (Entry: renders the dot path, touches the filesystem)
//!     → <root>/html.dir/index.html.data   (content)
//!       <root>/html.dir/index.html.meta*  (metadata subtree)
//!       <root>/html.dir/index.html.dir/   (children)
//! ```
//!
//! # On-disk layout
//! ```text
//! URI: /                Path: <root>/data
//!      /robots.txt            <root>/robots.txt.data
//!      /html                  <root>/html.data
//!      /html/                 <root>/html.dir/data
//!      /html/index.html       <root>/html.dir/index.html.data
//!      /file?meta=a           <root>/file.metadir/a.data
//!      /file?meta=/a/         <root>/file.metadir/a.dir/data
//! ```
//!
//! # Design Decisions
//! - Identity is a list of steps, the dot path is derived from it
//! - Content is only ever replaced by renaming a staged file over it
//! - No in-process locking: concurrent commits race at the rename

pub mod entry;
pub mod error;
pub mod path;

pub use entry::{Entry, EntryWriter};
pub use error::StoreError;
pub use path::EntryPath;
