//! Runtime configuration.

/// Tunables for one thread's reactive runtime.
///
/// Installed with [`Runtime::configure`](crate::reactive::Runtime::configure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How many rounds a single flush may run before a write that keeps
    /// re-triggering effects is reported as a cycle.
    pub max_flush_iterations: u32,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_FLUSH_ITERATIONS: u32 = 100;

    pub fn with_max_flush_iterations(mut self, max: u32) -> Self {
        self.max_flush_iterations = max;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: Self::DEFAULT_MAX_FLUSH_ITERATIONS,
        }
    }
}
