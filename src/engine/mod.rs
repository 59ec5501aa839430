pub mod lifecycle;
pub mod search;
pub mod selector;
pub mod sweep;
