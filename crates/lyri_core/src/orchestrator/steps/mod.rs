//! Pipeline steps.

mod align;
mod compose;
mod deliver;
mod separate;

pub use align::AlignStep;
pub use compose::ComposeStep;
pub use deliver::DeliverStemsStep;
pub use separate::SeparateStep;
