//! Business workflows: project placement and proctored assessment.

pub mod assessment;
pub mod placement;
