pub mod errors;
pub mod events;
pub mod ids;
pub mod markdown;
pub mod view;
pub mod workflow;
