pub mod contacts;
pub mod controller;
pub mod delivery;
pub mod model;
pub mod preferences;
pub mod processor;
pub mod producer;
pub mod render;
pub mod store;

#[cfg(test)]
pub mod testing;
