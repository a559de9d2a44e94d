// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types and checked constructors to keep invariants in the type system.

mod color;
mod environment_name;
mod id;
mod image_ref;
mod traffic;

pub use color::Color;
pub use environment_name::{EnvironmentName, EnvironmentNameError};
pub use id::{ContainerId, DeploymentId, Id};
pub use image_ref::{ImageRef, ParseImageRefError, is_valid_tag};
pub use traffic::{TrafficSplit, TrafficSplitError};
