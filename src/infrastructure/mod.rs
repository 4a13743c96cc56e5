pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod goal_repository;
pub mod google_calendar_client;
pub mod oauth_client;
pub mod schedule_repository;
pub mod shift_repository;
pub mod storage;
