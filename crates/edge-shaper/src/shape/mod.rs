//! Request inspection and response shaping.

pub mod cors;
pub mod inspect;
pub mod redirect;
