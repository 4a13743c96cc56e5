pub mod bootstrap;
pub mod calendar_gateway;
pub mod commands;
pub mod oauth;
pub mod scheduler;
