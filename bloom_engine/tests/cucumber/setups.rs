use cucumber::given;

use crate::cucumber::{bloom_world::BloomSystem, BloomWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut BloomWorld) {
    let system = BloomSystem::new().await;
    world.system = Some(system);
}
