pub mod adjustments;
pub mod ai;
pub mod color_removal;
pub mod filters;
pub mod text;
pub mod transform;
