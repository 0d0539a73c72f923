//! `fragment` crate — the content fragment model and its payload store.
//!
//! A [`Fragment`] is an independently processable piece of a response.
//! Actions communicate through its [`Payload`]; parallel branches get
//! isolated [`PayloadBranch`] copies that are merged back deterministically.

pub mod fragment;
pub mod payload;

pub use fragment::{Fragment, FragmentStatus};
pub use payload::{Payload, PayloadBranch, PayloadDelta};
