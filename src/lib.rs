pub mod geom;
pub mod sim;
pub mod vecutils;

// Prelude
pub use geom::point::Point;
pub use geom::vector::Vector;
pub use sim::config::SimulationConfig;
pub use sim::medium::MediumSystem;
