//! Everything that touches the SIG portal: HTTP session, the lenient tag-tree
//! parser, and the per-page extraction routines.

pub mod client;
pub mod extract;
pub mod html;

pub use client::Sig;
