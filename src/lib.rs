//! The semantic core of an Elm editor backend.
//!
//! This crate owns three tightly coupled subsystems: the [`forest`] of
//! parsed syntax trees for every file in a workspace, the cross-file
//! reference and definition machinery in [`index`], [`imports`], and
//! [`resolve`], and the [`package`] layer that decides which dependency
//! sources belong to the forest in the first place. The editor RPC server
//! that sits on top of this crate is a separate concern; it talks to the
//! core exclusively through [`workspace::Workspace`].

pub mod cancel;
pub mod cst;
pub mod forest;
pub mod imports;
pub mod index;
pub mod package;
pub mod resolve;
pub mod source;
pub mod span;
pub mod workspace;
