//! Six-stage entropy quality battery.
//!
//! Stages fail when the source errors or hands back an all-zero buffer.
//! The battery as a whole passes when the injection, continuous and
//! boundary stages pass; the latency stages are informational.

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::EntropySource;

const SMALL_BLOCK: usize = 16;
const MIXED_BLOCK: usize = 64;
const LARGE_BLOCK: usize = 256;
const SEED_LEN: usize = 32;
const EXTRACTION_ROUNDS: usize = 10;
const CONTINUOUS_ROUNDS: usize = 100;
const LATENCY_ROUNDS: usize = 100;

/// Draws allowed for the single-byte boundary check; a lone zero byte is a
/// legitimate output one time in 256.
const SINGLE_BYTE_DRAWS: usize = 3;

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Stage name.
    pub name: &'static str,
    /// Whether the stage passed.
    pub passed: bool,
    /// Failed operations within the stage.
    pub failures: u32,
    /// Extra detail (timings, failing sub-check).
    pub detail: String,
}

/// Running totals across the battery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryStats {
    pub passed: u32,
    pub failed: u32,
    pub bytes_extracted: u64,
    pub bytes_injected: u64,
}

/// Result of a full battery run.
#[derive(Debug, Clone, Default)]
pub struct BatteryReport {
    pub stages: Vec<StageReport>,
    pub stats: BatteryStats,
    pub injection_pass: bool,
    pub continuous_pass: bool,
    pub boundary_pass: bool,
    pub extraction_avg: Duration,
    pub injection_avg: Duration,
}

impl BatteryReport {
    /// Whether the core stages passed.
    pub fn passed(&self) -> bool {
        self.injection_pass && self.continuous_pass && self.boundary_pass
    }
}

/// Battery runner.
#[derive(Debug, Clone)]
pub struct EntropyBattery {
    sample_gap: Duration,
    mix_settle: Duration,
}

impl Default for EntropyBattery {
    fn default() -> Self {
        Self {
            sample_gap: Duration::from_millis(10),
            mix_settle: Duration::from_millis(50),
        }
    }
}

fn has_data(buf: &[u8]) -> bool {
    buf.iter().any(|b| *b != 0)
}

/// Seed material from timer jitter, standing in for an external source.
fn timer_seed() -> [u8; SEED_LEN] {
    let origin = Instant::now();
    let mut seed = [0u8; SEED_LEN];
    for byte in seed.iter_mut() {
        *byte = (origin.elapsed().subsec_nanos() & 0xFF) as u8;
    }
    seed
}

impl EntropyBattery {
    /// Battery with the given pause between T1 samples and settle time
    /// after the T2 injection.
    pub fn new(sample_gap: Duration, mix_settle: Duration) -> Self {
        Self {
            sample_gap,
            mix_settle,
        }
    }

    /// Battery without pauses.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Run all six stages against `source`.
    pub fn run<S: EntropySource + ?Sized>(&self, source: &mut S) -> BatteryReport {
        let mut report = BatteryReport::default();

        self.multiple_extractions(source, &mut report);
        report.injection_pass = self.injection(source, &mut report);
        report.continuous_pass = self.continuous(source, &mut report);
        report.boundary_pass = self.boundary(source, &mut report);
        report.extraction_avg = self.extraction_latency(source, &mut report);
        report.injection_avg = self.injection_latency(source, &mut report);

        let stats = &report.stats;
        info!(
            "Entropy summary: passed={} failed={} bytes={} injected={}",
            stats.passed, stats.failed, stats.bytes_extracted, stats.bytes_injected
        );
        info!("Entropy core: {}", if report.passed() { "PASS" } else { "FAIL" });
        report
    }

    fn record(
        report: &mut BatteryReport,
        name: &'static str,
        failures: u32,
        detail: String,
    ) -> bool {
        let passed = failures == 0;
        if passed {
            report.stats.passed += 1;
            info!("{}: PASS {}", name, detail);
        } else {
            report.stats.failed += 1;
            warn!("{}: FAIL (failures={}) {}", name, failures, detail);
        }
        report.stages.push(StageReport {
            name,
            passed,
            failures,
            detail,
        });
        passed
    }

    /// Draw one block, counting it when it holds data.
    fn extract<S: EntropySource + ?Sized>(
        source: &mut S,
        buf: &mut [u8],
        report: &mut BatteryReport,
    ) -> bool {
        buf.fill(0);
        let ok = source.fill(buf).is_ok() && has_data(buf);
        if ok {
            report.stats.bytes_extracted += buf.len() as u64;
        }
        ok
    }

    fn multiple_extractions<S: EntropySource + ?Sized>(
        &self,
        source: &mut S,
        report: &mut BatteryReport,
    ) {
        let mut buf = [0u8; SMALL_BLOCK];
        let mut failures = 0;
        for _ in 0..EXTRACTION_ROUNDS {
            if !Self::extract(source, &mut buf, report) {
                failures += 1;
            }
            if !self.sample_gap.is_zero() {
                thread::sleep(self.sample_gap);
            }
        }
        Self::record(report, "T1 multiple extractions", failures, String::new());
    }

    fn injection<S: EntropySource + ?Sized>(
        &self,
        source: &mut S,
        report: &mut BatteryReport,
    ) -> bool {
        let seed = timer_seed();
        if let Err(e) = source.mix(&seed, SEED_LEN * 8) {
            return Self::record(report, "T2 entropy injection", 1, format!("(mix: {})", e));
        }
        report.stats.bytes_injected += SEED_LEN as u64;

        if !self.mix_settle.is_zero() {
            thread::sleep(self.mix_settle);
        }

        let mut mixed = [0u8; MIXED_BLOCK];
        if Self::extract(source, &mut mixed, report) {
            Self::record(report, "T2 entropy injection", 0, String::new())
        } else {
            Self::record(report, "T2 entropy injection", 1, "(post-mix)".into())
        }
    }

    fn continuous<S: EntropySource + ?Sized>(
        &self,
        source: &mut S,
        report: &mut BatteryReport,
    ) -> bool {
        let mut buf = [0u8; SMALL_BLOCK];
        let mut failures = 0;
        let start = Instant::now();
        for _ in 0..CONTINUOUS_ROUNDS {
            if !Self::extract(source, &mut buf, report) {
                failures += 1;
            }
        }
        let detail = format!(
            "({} blocks in {} ms)",
            CONTINUOUS_ROUNDS,
            start.elapsed().as_millis()
        );
        Self::record(report, "T3 continuous operation", failures, detail)
    }

    fn boundary<S: EntropySource + ?Sized>(
        &self,
        source: &mut S,
        report: &mut BatteryReport,
    ) -> bool {
        let mut failed = Vec::new();

        let mut tiny = [0u8; 1];
        if !(0..SINGLE_BYTE_DRAWS).any(|_| Self::extract(source, &mut tiny, report)) {
            failed.push("single-byte");
        }

        let mut large = [0u8; LARGE_BLOCK];
        if !Self::extract(source, &mut large, report) {
            failed.push("large buffer");
        }

        let mut first = [0u8; SMALL_BLOCK];
        let mut second = [0u8; SMALL_BLOCK];
        let back_to_back = Self::extract(source, &mut first, report)
            && Self::extract(source, &mut second, report);
        if !back_to_back {
            failed.push("back-to-back");
        }

        let detail = if failed.is_empty() {
            String::new()
        } else {
            format!("({})", failed.join(", "))
        };
        Self::record(report, "T4 boundary conditions", failed.len() as u32, detail)
    }

    fn extraction_latency<S: EntropySource + ?Sized>(
        &self,
        source: &mut S,
        report: &mut BatteryReport,
    ) -> Duration {
        let mut buf = [0u8; SMALL_BLOCK];
        let mut failures = 0;
        let mut total = Duration::ZERO;
        for _ in 0..LATENCY_ROUNDS {
            let start = Instant::now();
            let ok = Self::extract(source, &mut buf, report);
            total += start.elapsed();
            if !ok {
                failures += 1;
            }
        }
        let avg = total / LATENCY_ROUNDS as u32;
        let detail = format!("(avg_us={})", avg.as_micros());
        Self::record(report, "T5 extraction latency", failures, detail);
        avg
    }

    fn injection_latency<S: EntropySource + ?Sized>(
        &self,
        source: &mut S,
        report: &mut BatteryReport,
    ) -> Duration {
        let mut failures = 0;
        let mut total = Duration::ZERO;
        for _ in 0..LATENCY_ROUNDS {
            let seed = timer_seed();
            let start = Instant::now();
            let result = source.mix(&seed, SEED_LEN * 8);
            total += start.elapsed();
            match result {
                Ok(()) => report.stats.bytes_injected += SEED_LEN as u64,
                Err(_) => failures += 1,
            }
        }
        let avg = total / LATENCY_ROUNDS as u32;
        let detail = format!("(avg_us={})", avg.as_micros());
        Self::record(report, "T6 injection latency", failures, detail);
        avg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{EntropyError, EntropyPool};

    /// Source returning a fixed byte, optionally failing either operation.
    struct FixedSource {
        byte: u8,
        fail_fill: bool,
        fail_mix: bool,
        mixes: usize,
    }

    impl FixedSource {
        fn new(byte: u8) -> Self {
            Self {
                byte,
                fail_fill: false,
                fail_mix: false,
                mixes: 0,
            }
        }
    }

    impl EntropySource for FixedSource {
        fn fill(&mut self, buf: &mut [u8]) -> Result<(), EntropyError> {
            if self.fail_fill {
                return Err(EntropyError::EmptySeed);
            }
            buf.fill(self.byte);
            Ok(())
        }

        fn mix(&mut self, _seed: &[u8], _bits: usize) -> Result<(), EntropyError> {
            if self.fail_mix {
                return Err(EntropyError::EmptySeed);
            }
            self.mixes += 1;
            Ok(())
        }
    }

    // ==================== Battery Tests ====================

    #[test]
    fn test_battery_passes_with_working_source() {
        let mut source = FixedSource::new(0xA5);
        let report = EntropyBattery::immediate().run(&mut source);

        assert!(report.passed());
        assert_eq!(report.stages.len(), 6);
        assert_eq!(report.stats.passed, 6);
        assert_eq!(report.stats.failed, 0);
        // T1 160 + T2 64 + T3 1600 + T4 (1 + 256 + 32) + T5 1600
        assert_eq!(report.stats.bytes_extracted, 160 + 64 + 1600 + 289 + 1600);
        // T2 32 + T6 3200
        assert_eq!(report.stats.bytes_injected, 32 + 3200);
        assert_eq!(source.mixes, 101);
    }

    #[test]
    fn test_zero_output_fails_every_extraction_stage() {
        let mut source = FixedSource::new(0);
        let report = EntropyBattery::immediate().run(&mut source);

        assert!(!report.passed());
        assert!(!report.injection_pass);
        assert!(!report.continuous_pass);
        assert!(!report.boundary_pass);
        assert_eq!(report.stats.bytes_extracted, 0);
        // T6 only mixes
        assert_eq!(report.stats.passed, 1);
        assert_eq!(report.stages[3].failures, 3);
        assert!(report.stages[3].detail.contains("single-byte"));
    }

    #[test]
    fn test_mix_failure_fails_injection_only() {
        let mut source = FixedSource::new(0x11);
        source.fail_mix = true;
        let report = EntropyBattery::immediate().run(&mut source);

        assert!(!report.injection_pass);
        assert!(report.continuous_pass);
        assert!(report.boundary_pass);
        assert!(!report.passed());
        assert_eq!(report.stats.bytes_injected, 0);
        assert!(report.stages[1].detail.contains("mix"));
        assert_eq!(report.stages[5].failures, LATENCY_ROUNDS as u32);
    }

    #[test]
    fn test_fill_failure() {
        let mut source = FixedSource::new(0x11);
        source.fail_fill = true;
        let report = EntropyBattery::immediate().run(&mut source);
        assert!(!report.passed());
        assert_eq!(report.stages[0].failures, EXTRACTION_ROUNDS as u32);
        assert_eq!(report.stages[1].detail, "(post-mix)");
    }

    #[test]
    fn test_battery_on_pool() {
        let mut pool = EntropyPool::new().unwrap();
        let report = EntropyBattery::immediate().run(&mut pool);
        assert!(report.passed(), "{:?}", report.stages);
        assert_eq!(pool.credited_bits(), 101 * 256);
    }

    #[test]
    fn test_timer_seed_length() {
        assert_eq!(timer_seed().len(), SEED_LEN);
    }
}
