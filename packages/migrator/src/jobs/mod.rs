//! One module per batch transfer between the legacy schema and a target
//! database. Each implements `runner::TransferJob`; `audit` holds the
//! read-only consistency checks.

pub mod agent_personas;
pub mod airlines;
pub mod airports;
pub mod audit;
pub mod bdm_personas;
pub mod bdm_users;
pub mod city_references;
pub mod credentials;
pub mod hotels;
pub mod member_personas;
pub mod organization_instances;
pub mod organization_users;
pub mod organizations;
pub mod packages;
pub mod users;
