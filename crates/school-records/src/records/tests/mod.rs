mod common;
mod courses;
mod students;
