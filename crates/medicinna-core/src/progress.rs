use tokio::sync::watch;

/// Publishes OCR progress in percent. Reports never go backwards.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<u8>,
}

impl ProgressReporter {
    pub fn new() -> (Self, watch::Receiver<u8>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, rx)
    }

    /// Reporter nobody listens to
    pub fn detached() -> Self {
        Self::new().0
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        self.tx.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    /// Report a fraction in `[0, 1]`
    pub fn report_fraction(&self, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.report(percent);
    }

    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let (progress, rx) = ProgressReporter::new();
        progress.report(20);
        progress.report(10);
        assert_eq!(*rx.borrow(), 20);
        progress.report_fraction(0.555);
        assert_eq!(progress.current(), 56);
        progress.report(250);
        assert_eq!(progress.current(), 100);
    }
}
