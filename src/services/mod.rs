//! Business logic services

pub mod cars;
pub mod email;
pub mod redis;
pub mod stats;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub cars: cars::CarsService,
    pub stats: stats::StatsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig, redis_service: redis::RedisService) -> Self {
        Self {
            users: users::UsersService::new(
                repository.clone(),
                config.auth.clone(),
                config.frontend.url.clone(),
                Arc::new(redis_service),
                email::EmailService::new(config.email.clone()),
            ),
            cars: cars::CarsService::new(repository.clone(), cars::MediaStore::new(&config.uploads)),
            stats: stats::StatsService::new(Arc::new(repository.cars.clone())),
            repository,
        }
    }
}
