// ABOUTME: Diagnostics sink handed to every component at construction time
// ABOUTME: Wraps tracing so verbosity is an explicit value rather than ambient process state

/// Where components send their log lines. Cheap to copy into every component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    verbose: bool,
}

impl Diagnostics {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// A sink that drops debug output.
    #[cfg(test)]
    pub fn quiet() -> Self {
        Self { verbose: false }
    }

    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    pub fn debug(&self, msg: &str) {
        if self.verbose {
            tracing::debug!("{msg}");
        }
    }

    /// Install the stderr subscriber. Only `main` calls this.
    pub fn install(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };

        // Stdout belongs to the remote shell once a session starts.
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .with_target(false)
            .without_time()
            .try_init();
    }
}
