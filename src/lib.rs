pub mod auth;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod pages;
pub mod routes;
pub mod session;
pub mod workflow;
