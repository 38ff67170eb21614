pub mod ai;
pub mod arena;
pub mod physics;
pub mod spawn;
