//! Answer grading against the documents that grounded it.

pub mod grader;

pub use grader::{GradeVerdict, HallucinationGrader};
