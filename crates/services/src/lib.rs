#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod roadmap_service;
pub mod skill_service;
pub mod sync;

pub use progress_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError};
pub use roadmap_service::{RoadmapProgressService, RoadmapSaved};
pub use skill_service::{SkillProgressService, skill_key};
