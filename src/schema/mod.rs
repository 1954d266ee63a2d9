//! Plain data types shared by the parsers, the executor and the collaborators.

pub mod block;
pub mod knowledge;
pub mod message;
pub mod template;
pub mod value;
