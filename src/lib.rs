//! Clinic front desk: doctors, insurance providers, patients, appointments,
//! users with role-based permissions, and the daily billing report.

pub mod authorization;
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod consts;
pub mod db;
pub mod forms;
pub mod models;
pub mod report;
pub mod services;
pub mod utils;
