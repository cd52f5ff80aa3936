mod bloom_world;
mod setups;
mod steps;

pub use bloom_world::BloomWorld;
