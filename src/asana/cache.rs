//! Caching implementations for Asana types.

use crate::cache::Cacheable;

use super::types::Task;

impl Cacheable for Task {
  fn cache_prefix() -> &'static str {
    "task"
  }
}
