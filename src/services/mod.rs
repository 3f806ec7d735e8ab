pub mod agent;
pub mod auth_service;
pub mod repository;
