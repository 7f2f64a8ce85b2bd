use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Wall-clock, CPU and memory numbers captured at the end of one pipeline phase.
#[derive(Debug, Clone)]
pub struct PhaseSample {
    pub phase: String,
    pub elapsed: Duration,
    /// Process CPU usage since the previous sample, in percent of one core.
    pub cpu_percent: Option<f32>,
    pub memory_mb: Option<u64>,
}

/// Records phase timings for a collector/analyzer run. CPU and memory
/// sampling need the `cli` feature (sysinfo); without it only timings are kept.
pub struct RunMonitor {
    enabled: bool,
    started: Instant,
    last_mark: Instant,
    samples: Vec<PhaseSample>,
    #[cfg(feature = "cli")]
    system: System,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
}

impl RunMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        let mut monitor = Self {
            enabled,
            started: now,
            last_mark: now,
            samples: Vec::new(),
            #[cfg(feature = "cli")]
            system: System::new(),
            #[cfg(feature = "cli")]
            pid: sysinfo::get_current_pid().ok(),
        };
        // CPU usage is a delta between refreshes, so take a baseline now.
        if enabled {
            monitor.refresh_process();
        }
        monitor
    }

    /// Closes the current phase and logs it.
    pub fn mark(&mut self, phase: &str) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let (cpu_percent, memory_mb) = self.refresh_process().unzip();
        let sample = PhaseSample {
            phase: phase.to_string(),
            elapsed: now - self.last_mark,
            cpu_percent,
            memory_mb,
        };
        self.last_mark = now;

        match (sample.cpu_percent, sample.memory_mb) {
            (Some(cpu), Some(mb)) => tracing::info!(
                "📊 {} took {:?}, CPU {:.1}%, resident memory {}MB",
                sample.phase,
                sample.elapsed,
                cpu,
                mb
            ),
            _ => tracing::info!("📊 {} took {:?}", sample.phase, sample.elapsed),
        }
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[PhaseSample] {
        &self.samples
    }

    pub fn peak_memory_mb(&self) -> Option<u64> {
        self.samples.iter().filter_map(|s| s.memory_mb).max()
    }

    pub fn log_summary(&self) {
        if !self.enabled {
            return;
        }
        let total = self.started.elapsed();
        match self.peak_memory_mb() {
            Some(peak) => tracing::info!("📊 Run finished in {:?}, peak memory {}MB", total, peak),
            None => tracing::info!("📊 Run finished in {:?}", total),
        }
    }

    /// Returns `(cpu_percent, memory_mb)` for this process.
    #[cfg(feature = "cli")]
    fn refresh_process(&mut self) -> Option<(f32, u64)> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        self.system
            .process(pid)
            .map(|process| (process.cpu_usage(), process.memory() / 1024 / 1024))
    }

    #[cfg(not(feature = "cli"))]
    fn refresh_process(&mut self) -> Option<(f32, u64)> {
        None
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
