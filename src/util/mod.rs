pub mod clock;
pub mod memory;
pub mod telemetry;

pub use clock::*;
pub use memory::*;
pub use telemetry::*;
