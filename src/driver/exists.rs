use tracing::error;

use super::Driver;

impl Driver {
    /// Whether layer `layer_id` is present in the layer store.
    ///
    /// Backend failures are logged and reported as absent.
    pub fn exists(&self, layer_id: &str) -> bool {
        match self.layers.layer_exists(layer_id) {
            Ok(exists) => exists,
            Err(e) => {
                error!(layer_id, error = %e, "checking layer existence failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::testutil::TestDriver;

    #[test]
    fn reports_presence() {
        let t = TestDriver::new();
        assert!(!t.driver.exists("l1"));
        t.fakes.layers.insert("l1");
        assert!(t.driver.exists("l1"));
    }

    #[test]
    fn backend_errors_read_as_absent() {
        let t = TestDriver::new();
        t.fakes.layers.insert("l1");
        *t.fakes.layers.exists_error.lock().unwrap() = Some("boom".to_string());
        assert!(!t.driver.exists("l1"));
    }
}
