use tracing::info;

use super::Driver;
use crate::error::Result;

impl Driver {
    /// Remove bundle `bundle_id`'s volume. Layers are never touched.
    ///
    /// Deleting a bundle that does not exist succeeds.
    pub fn delete(&self, bundle_id: &str) -> Result<()> {
        self.store()?;

        if !self.volumes.layer_exists(bundle_id)? {
            info!(bundle_id, "volume not found");
            return Ok(());
        }

        self.volumes.destroy_layer(bundle_id)?;
        info!(bundle_id, "volume deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::fakes::Call;
    use crate::driver::testutil::TestDriver;
    use crate::error::Error;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn destroys_existing_volume_only() {
        let t = TestDriver::new();
        t.fakes.volumes.insert("b1");
        t.driver.delete("b1").unwrap();

        assert_eq!(
            t.fakes.volumes.calls(),
            vec![Call::Exists("b1".to_string()), Call::Destroy("b1".to_string())]
        );
        assert!(t.fakes.layers.calls().is_empty());
    }

    #[test]
    fn missing_volume_logs_and_succeeds() {
        let t = TestDriver::new();
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            t.driver.delete("ghost").unwrap();
            t.driver.delete("ghost").unwrap();
        });

        assert!(!t
            .fakes
            .volumes
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Destroy(_))));
        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("volume not found"), "{}", logs);
        assert!(logs.contains("bundle_id=\"ghost\""), "{}", logs);
    }

    #[test]
    fn existence_errors_propagate() {
        let t = TestDriver::new();
        *t.fakes.volumes.exists_error.lock().unwrap() = Some("boom".to_string());
        assert!(matches!(t.driver.delete("b1"), Err(Error::Backend(_))));
    }

    #[test]
    fn requires_store() {
        let t = TestDriver::without_store();
        assert!(matches!(t.driver.delete("b1"), Err(Error::EmptyDriverStore)));
        assert!(t.fakes.volumes.calls().is_empty());
    }
}
