pub mod core;
pub mod editor;
pub mod grade_reports;
pub mod roster;
pub mod templates;
