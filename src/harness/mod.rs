//! Probe orchestration.
//!
//! Runs the entropy battery, brings the link up under the retry policy,
//! performs one exchange, tears the link down and reports every stage in
//! TAP form. The process exit code follows the [`Verdict`].

mod report;

use std::io::Write;
use std::thread;

use log::{info, warn};

use crate::config::ProbeConfig;
use crate::entropy::{EntropyBattery, EntropySource};
use crate::exchange::{EndpointFactory, ExchangeEngine, ExchangeOutcome, UdpEndpointFactory};
use crate::link::{LinkController, LinkDriver};

pub use report::{StageResult, TapReporter};

/// Poll intervals the teardown waits for the disconnect to settle.
const TEARDOWN_POLLS: u32 = 5;

/// TAP lines emitted by a full run: six battery stages, the entropy core
/// verdict, link, exchange and teardown.
pub const PLANNED_STAGES: usize = 10;

/// Overall result of a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Entropy core stages passed.
    pub entropy: bool,
    /// The link came up within the retry budget.
    pub link: bool,
    /// The exchange produced a response.
    pub exchange: bool,
}

impl Verdict {
    /// Whether the probe passed.
    pub fn passed(&self) -> bool {
        self.entropy && self.link && self.exchange
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Sequences one probe run.
pub struct Harness {
    config: ProbeConfig,
    battery: EntropyBattery,
}

impl Harness {
    /// Harness with the default battery timing.
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            battery: EntropyBattery::default(),
        }
    }

    /// Replace the entropy battery.
    pub fn with_battery(mut self, battery: EntropyBattery) -> Self {
        self.battery = battery;
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// A link controller over `driver` using the configured poll interval.
    pub fn controller<D: LinkDriver>(&self, driver: D) -> LinkController<D> {
        LinkController::new(driver).with_poll_interval(self.config.poll_interval)
    }

    /// A UDP exchange engine using the configured pump slice.
    pub fn engine(&self) -> ExchangeEngine<UdpEndpointFactory> {
        ExchangeEngine::new().with_pump_slice(self.config.pump_slice)
    }

    /// Run every stage and return the verdict.
    pub fn run<D, F, S, W>(
        &self,
        controller: &mut LinkController<D>,
        engine: &mut ExchangeEngine<F>,
        entropy: &mut S,
        reporter: &mut TapReporter<W>,
    ) -> Verdict
    where
        D: LinkDriver,
        F: EndpointFactory,
        S: EntropySource + ?Sized,
        W: Write,
    {
        info!("=== Entropy Pool + CoAP Probe ===");
        reporter.header(PLANNED_STAGES);

        let battery = self.battery.run(entropy);
        for stage in &battery.stages {
            let reason = format!("failures={} {}", stage.failures, stage.detail);
            reporter.check(stage.name, stage.passed, reason.trim_end());
        }
        let entropy_ok = reporter.check(
            "entropy core",
            battery.passed(),
            "injection, continuous and boundary stages must all pass",
        );

        controller.initialize();
        let link_ok = match self.config.retry.establish(
            controller,
            &self.config.credentials,
            self.config.connect_timeout,
        ) {
            Ok(attempt) => {
                reporter.comment(&format!(
                    "connected to '{}' on attempt {}/{}",
                    self.config.credentials.ssid, attempt, self.config.retry.max_attempts
                ));
                reporter.ok("link established");
                true
            }
            Err(e) => {
                warn!("Wi-Fi failed: {}", e);
                reporter.not_ok("link established", &e.to_string());
                false
            }
        };

        let exchange_ok = if link_ok {
            thread::sleep(self.config.settle_delay);
            let passed = self.exchange(engine, reporter);
            self.teardown(controller, reporter);
            passed
        } else {
            reporter.skip("coap exchange", "link down");
            reporter.skip("link teardown", "link down");
            false
        };

        let verdict = Verdict {
            entropy: entropy_ok,
            link: link_ok,
            exchange: exchange_ok,
        };
        info!("=== FINAL RESULT ===");
        info!(
            "Entropy: {}, Link: {}, CoAP: {}",
            pass_fail(verdict.entropy),
            pass_fail(verdict.link),
            pass_fail(verdict.exchange)
        );
        reporter.finish();
        verdict
    }

    fn exchange<F: EndpointFactory, W: Write>(
        &self,
        engine: &mut ExchangeEngine<F>,
        reporter: &mut TapReporter<W>,
    ) -> bool {
        let outcome = engine.run_exchange(&self.config.coap_uri, self.config.exchange_deadline);
        match &outcome {
            ExchangeOutcome::Success(_) => {
                reporter.comment(&format!("response: {}", outcome));
                reporter.ok("coap exchange");
                true
            }
            _ => {
                reporter.not_ok("coap exchange", &outcome.to_string());
                false
            }
        }
    }

    fn teardown<D: LinkDriver, W: Write>(
        &self,
        controller: &mut LinkController<D>,
        reporter: &mut TapReporter<W>,
    ) {
        controller.request_disconnect();
        let budget = self.config.poll_interval * TEARDOWN_POLLS;
        let settled = controller
            .bridge()
            .state()
            .wait_until(budget, |s| !s.connected && !s.disconnecting);
        reporter.check(
            "link teardown",
            !settled.connected,
            "link still up after disconnect request",
        );
    }
}
