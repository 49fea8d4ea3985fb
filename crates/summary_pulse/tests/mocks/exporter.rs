use std::sync::{Arc, Mutex};

use summary_pulse::{ExportRequest, Exporter};

/// Records export requests and answers with a fixed location.
#[derive(Clone)]
pub struct MockExporter {
    requests: Arc<Mutex<Vec<ExportRequest>>>,
    location: String,
    fail_with: Option<String>,
}

impl MockExporter {
    pub fn new() -> Self {
        MockExporter {
            requests: Arc::new(Mutex::new(Vec::new())),
            location: "out/test-summary.md".to_string(),
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut exporter = Self::new();
        exporter.fail_with = Some(message.to_string());
        exporter
    }

    pub fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Exporter for MockExporter {
    type Error = anyhow::Error;

    async fn export(&self, request: ExportRequest) -> Result<String, anyhow::Error> {
        self.requests.lock().unwrap().push(request);
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }
        Ok(self.location.clone())
    }
}
