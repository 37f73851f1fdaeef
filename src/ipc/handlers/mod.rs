pub mod calendar;
pub mod comments;
pub mod config;
pub mod core;
pub mod courses;
pub mod gradebook;
pub mod grades;
pub mod mp_grades;
pub mod students;
