use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::RunMonitor;

/// Drives any [`Pipeline`] through extract, transform and load.
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: RunMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: RunMonitor::new(monitor_enabled),
        }
    }

    /// Returns where the output was written.
    pub async fn run(&mut self) -> Result<String> {
        tracing::info!("Extracting data...");
        let raw_data = self.pipeline.extract().await?;
        self.monitor.mark("extract");

        tracing::info!("Transforming data...");
        let transformed = self.pipeline.transform(raw_data).await?;
        self.monitor.mark("transform");

        tracing::info!("Loading data...");
        let output_path = self.pipeline.load(transformed).await?;
        self.monitor.mark("load");

        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_summary();
        Ok(output_path)
    }
}
