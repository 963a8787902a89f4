//! Core library of a dialogue tree editor for Aurora-style RPG
//! conversations.
//!
//! The crate is framework-agnostic: it owns the binary container codec
//! ([`gff`]), the dialogue graph model and its integrity engines (link
//! registry, cascade delete, orphan management, cycle-safe cloning,
//! snapshot undo), and an [`EditSession`] facade that GUIs, CLIs, and
//! tests drive. Rendering, input, and settings live with the callers.

mod adapter;
mod cascade;
mod clipboard;
mod dialog;
mod error;
pub mod gff;
mod history;
mod orphan;
mod registry;
mod session;
mod version;

pub use adapter::{dialog_from_gff, dialog_to_gff};
pub use cascade::{cascade_delete, compute_cascade_set, DeleteOutcome};
pub use clipboard::Clipboard;
pub use dialog::{
    Dialog, DialogId, DialogNode, EdgeKind, GraphStats, NodeId, NodeKind, Pointer, PointerId,
    DEFAULT_DELAY,
};
pub use error::{DlgError, DlgResult};
pub use history::History;
pub use orphan::{
    container_subtree, ensure_orphan_container, find_orphan_container,
    identify_orphaned_link_children, reachable_from, reachable_from_starts,
    remove_orphaned_nodes, remove_orphaned_pointers, OrphanContainer, ORPHAN_CONTAINER_COMMENT,
    ORPHAN_GUARD_SCRIPT,
};
pub use registry::{LinkRegistry, PointerOwner, PointerRef};
pub use session::{EditSession, EditorLimits};
pub use version::{CONTAINER_VERSION, DIALOG_FILE_TYPE};
