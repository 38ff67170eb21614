pub mod body;
pub mod constants;
pub mod food;
pub mod spatial;
pub mod systems;
pub mod trail;
pub mod world;
