//! Alchemy Engine Core
//!
//! Contains the entity storage and query engine:
//! - Entity Component System (ECS)
//! - World configuration

pub mod config;
pub mod ecs;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
