use std::time::{Duration, Instant};

use log::info;

/// Per-epoch wall clock accounting for a device.
#[derive(Debug, Default)]
pub struct DeviceMetrics {
    epoch_start: Option<Instant>,
    compute_total: Duration,
    update_total: Duration,
}

impl DeviceMetrics {
    /// Opens a new epoch window, zeroing the accumulated times.
    pub fn start_epoch(&mut self) {
        self.epoch_start = Some(Instant::now());
        self.compute_total = Duration::ZERO;
        self.update_total = Duration::ZERO;
    }

    /// Closes the epoch window and logs the time split.
    pub fn finish_epoch(&mut self, device_name: &str) {
        let Some(start) = self.epoch_start.take() else {
            return;
        };
        let total = start.elapsed().max(Duration::from_millis(1));
        let compute_frac = self.compute_total.as_secs_f64() / total.as_secs_f64();
        let update_frac = self.update_total.as_secs_f64() / total.as_secs_f64();
        info!(
            "device {} epoch time stats: total {}, {:.02}% computing, {:.02}% updating data",
            device_name,
            hms(total),
            compute_frac * 100.0,
            update_frac * 100.0,
        );
    }

    #[inline]
    pub fn add_compute(&mut self, elapsed: Duration) {
        self.compute_total += elapsed;
    }

    #[inline]
    pub fn add_update(&mut self, elapsed: Duration) {
        self.update_total += elapsed;
    }

    pub fn compute_total(&self) -> Duration {
        self.compute_total
    }

    pub fn update_total(&self) -> Duration {
        self.update_total
    }
}

fn hms(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_formatting() {
        assert_eq!(hms(Duration::from_secs(0)), "0:00:00");
        assert_eq!(hms(Duration::from_secs(61)), "0:01:01");
        assert_eq!(hms(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn epoch_window_accumulates() {
        let mut metrics = DeviceMetrics::default();
        metrics.start_epoch();
        metrics.add_compute(Duration::from_millis(30));
        metrics.add_update(Duration::from_millis(10));
        assert_eq!(metrics.compute_total(), Duration::from_millis(30));

        metrics.start_epoch();
        assert_eq!(metrics.compute_total(), Duration::ZERO);
    }
}
