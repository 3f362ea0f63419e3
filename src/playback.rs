pub mod compositor;
pub mod schedule;
