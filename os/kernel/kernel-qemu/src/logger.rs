use crate::qemu_trace;
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend that prints `[LEVEL] target: message` lines to the QEMU console.
#[derive(Debug, Clone, Copy)]
pub struct QemuLogger {
    max_level: LevelFilter,
}

static LOGGER: SyncOnceCell<QemuLogger> = SyncOnceCell::new();

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Installs the logger as the global `log` backend.
    ///
    /// # Errors
    /// Fails if a logger (this one or any other) was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(logger.max_level);
        Ok(())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn metadata(level: Level) -> Metadata<'static> {
        Metadata::builder().level(level).target("kernel_alloc").build()
    }

    #[test]
    fn filters_below_max_level() {
        let logger = QemuLogger::new(LevelFilter::Info);
        assert!(logger.enabled(&metadata(Level::Error)));
        assert!(logger.enabled(&metadata(Level::Info)));
        assert!(!logger.enabled(&metadata(Level::Debug)));
        assert!(!logger.enabled(&metadata(Level::Trace)));
    }

    #[test]
    fn off_disables_everything() {
        let logger = QemuLogger::new(LevelFilter::Off);
        assert!(!logger.enabled(&metadata(Level::Error)));
    }

    #[test]
    fn second_install_is_rejected() {
        let first = QemuLogger::new(LevelFilter::Debug).init();
        assert!(first.is_ok());
        assert_eq!(log::max_level(), LevelFilter::Debug);
        assert!(QemuLogger::new(LevelFilter::Trace).init().is_err());
        log::debug!(target: "kernel_vmem", "mapped {} pages", 3);
    }
}
