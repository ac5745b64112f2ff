/*
    Simulated inputs for pulse design: excitation k-space trajectories, birdcage transmit
    sensitivities and smooth target patterns.
 */
pub mod trajectory;
pub mod birdcage;
pub mod phantom;

pub use trajectory::{Geometry, generate_trajectory, radial, spiral, stack_of};
pub use birdcage::birdcage_maps;
pub use phantom::blurred_disc;
