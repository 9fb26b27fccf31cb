//! Traits implemented by components and by the workflow builder.
//!
//! Plugins yield objects implementing these traits from their builds; the
//! runtime only ever talks to components through them.

pub mod builder;
pub mod built;
pub mod evaluator;
pub mod front_end;
pub mod memory;
pub mod provider;
pub mod telemetry;

pub use builder::*;
pub use built::*;
pub use evaluator::*;
pub use front_end::*;
pub use memory::*;
pub use provider::*;
pub use telemetry::*;
