//! Shared state for the read API.

use readmodels_projections::Repositories;

/// Page size used when a list request has no `limit`.
pub const DEFAULT_PAGE_LIMIT: usize = 12;

/// Application state shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Read-model repositories
    pub repositories: Repositories,
    /// Page size when `limit` is omitted
    pub default_limit: usize,
}

impl AppState {
    /// State over `repositories` with [`DEFAULT_PAGE_LIMIT`].
    #[must_use]
    pub const fn new(repositories: Repositories) -> Self {
        Self {
            repositories,
            default_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Override the default page size (zero is raised to one).
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }
}
