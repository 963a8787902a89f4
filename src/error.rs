use miette::Diagnostic;
use thiserror::Error;

use crate::gff::GffError;

pub type DlgResult<T> = Result<T, DlgError>;

#[derive(Debug, Error, Diagnostic)]
pub enum DlgError {
    #[error("container parse failed: {0}")]
    #[diagnostic(code("dlg.parse"))]
    Parse(#[from] GffError),
    #[error("dialogue mapping failed: {0}")]
    #[diagnostic(code("dlg.mapping"))]
    Mapping(String),
    #[error("validation failed: {0}")]
    #[diagnostic(code("dlg.validation"))]
    Validation(String),
    #[error("unknown node id {0}")]
    #[diagnostic(code("dlg.unknown_node"))]
    UnknownNode(u32),
    #[error("pointer would break speaker alternation: {0}")]
    #[diagnostic(code("dlg.alternation"))]
    Alternation(String),
    #[error("clipboard is empty")]
    #[diagnostic(code("dlg.clipboard_empty"))]
    ClipboardEmpty,
    #[error("cannot paste as link: {0}")]
    #[diagnostic(code("dlg.link_rejected"))]
    LinkRejected(String),
    #[error("nothing to undo")]
    #[diagnostic(code("dlg.undo_exhausted"))]
    UndoExhausted,
    #[error("nothing to redo")]
    #[diagnostic(code("dlg.redo_exhausted"))]
    RedoExhausted,
    #[error("io error: {0}")]
    #[diagnostic(code("dlg.io"))]
    Io(#[from] std::io::Error),
}
