pub mod busy_time;
pub mod consumption;
pub mod day_plan;
pub mod free_slots;
pub mod interval;
pub mod models;
pub mod planner;
pub mod rules;
