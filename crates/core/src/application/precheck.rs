// Network precondition chain
// interface -> IPv4 address -> default gateway -> gateway reachability
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::constants::{IFACE_DOWN_MARKER, INET_MARKER, IP_TOOL, PING_DEADLINE_SECS, PING_TOOL};
use crate::domain::{CaptureConfig, Gateway, PreconditionResult, ReasonCode};
use crate::port::CommandRunner;

/// Result of running the whole chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// Every stage passed; the gateway is known and reachable
    Passed(Gateway),
    /// A stage failed and the later ones were never run
    Failed {
        result: PreconditionResult,
        /// Known only if the failing stage came after discovery
        gateway: Option<Gateway>,
    },
}

/// Ordered, short-circuiting network health checks
pub struct PreconditionChain {
    runner: Arc<dyn CommandRunner>,
    iface: String,
    gateway_override: Option<String>,
    query_timeout: Duration,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

impl PreconditionChain {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        iface: impl Into<String>,
        gateway_override: Option<String>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            iface: iface.into(),
            gateway_override: gateway_override.filter(|gw| !gw.trim().is_empty()),
            query_timeout,
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &CaptureConfig) -> Self {
        Self::new(
            runner,
            config.iface.clone(),
            config.gateway_ip.clone(),
            config.query_timeout,
        )
    }

    /// Run all stages in order, stopping at the first failure
    pub async fn run(&self) -> ChainOutcome {
        let iface = self.check_iface().await;
        if !iface.ok {
            return ChainOutcome::Failed {
                result: iface,
                gateway: None,
            };
        }

        let address = self.check_address().await;
        if !address.ok {
            return ChainOutcome::Failed {
                result: address,
                gateway: None,
            };
        }

        let gateway = match self.discover_gateway().await {
            Ok(gateway) => gateway,
            Err(result) => {
                return ChainOutcome::Failed {
                    result,
                    gateway: None,
                }
            }
        };

        let reachability = self.check_gateway(&gateway).await;
        if !reachability.ok {
            return ChainOutcome::Failed {
                result: reachability,
                gateway: Some(gateway),
            };
        }

        info!(
            iface = %self.iface,
            gateway_ip = %gateway.ip,
            gateway_source = gateway.source.as_str(),
            "Network preconditions passed"
        );
        ChainOutcome::Passed(gateway)
    }

    /// Stage 1: the interface exists and is not down
    pub async fn check_iface(&self) -> PreconditionResult {
        let output = self
            .runner
            .run_argv(&argv(&[IP_TOOL, "link", "show", &self.iface]), self.query_timeout)
            .await;

        if !output.success() {
            return PreconditionResult::fail(ReasonCode::IfaceNotFound)
                .with("stderr", output.stderr);
        }
        if output.stdout.contains(IFACE_DOWN_MARKER) {
            return PreconditionResult::fail(ReasonCode::IfaceDown).with("ip_link", output.stdout);
        }

        debug!(iface = %self.iface, "Interface is up");
        PreconditionResult::pass().with("ip_link", output.stdout)
    }

    /// Stage 2: the interface has an IPv4 address
    pub async fn check_address(&self) -> PreconditionResult {
        let output = self
            .runner
            .run_argv(
                &argv(&[IP_TOOL, "-4", "addr", "show", "dev", &self.iface]),
                self.query_timeout,
            )
            .await;

        if !output.success() {
            return PreconditionResult::fail(ReasonCode::AddrCmdError)
                .with("stderr", output.stderr);
        }
        if !output.stdout.contains(INET_MARKER) {
            return PreconditionResult::fail(ReasonCode::NoIpAddr).with("ip_addr", output.stdout);
        }

        debug!(iface = %self.iface, "Interface has an IPv4 address");
        PreconditionResult::pass().with("ip_addr", output.stdout)
    }

    /// Stage 3: configured gateway, else the first `default via` route
    pub async fn discover_gateway(&self) -> Result<Gateway, PreconditionResult> {
        if let Some(ip) = &self.gateway_override {
            debug!(gateway_ip = %ip, "Using configured gateway");
            return Ok(Gateway::configured(ip.trim()));
        }

        let output = self
            .runner
            .run_argv(
                &argv(&[IP_TOOL, "route", "show", "default"]),
                self.query_timeout,
            )
            .await;

        if !output.success() {
            return Err(PreconditionResult::fail(ReasonCode::NoDefaultRoute)
                .with("stderr", output.stderr));
        }

        Gateway::from_route_table(&output.stdout).ok_or_else(|| {
            PreconditionResult::fail(ReasonCode::NoDefaultRoute).with("ip_route", output.stdout)
        })
    }

    /// Stage 4: one probe packet reaches the gateway
    pub async fn check_gateway(&self, gateway: &Gateway) -> PreconditionResult {
        let deadline = PING_DEADLINE_SECS.to_string();
        let output = self
            .runner
            .run_argv(
                &argv(&[PING_TOOL, "-c", "1", "-W", &deadline, &gateway.ip]),
                self.query_timeout,
            )
            .await;

        let result = if output.success() {
            PreconditionResult::pass()
        } else {
            PreconditionResult::fail(ReasonCode::GatewayUnreach)
        };
        result
            .with("ping_stdout", output.stdout)
            .with("ping_stderr", output.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GatewaySource;
    use crate::port::command_runner::mocks::FakeCommandRunner;
    use crate::port::CommandOutput;

    const LINK_UP: &str = "3: wlp2s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP mode DORMANT";
    const LINK_DOWN: &str = "3: wlp2s0: <BROADCAST,MULTICAST> mtu 1500 qdisc noqueue state DOWN mode DORMANT";
    const ADDR: &str = "3: wlp2s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n    inet 192.168.12.34/24 brd 192.168.12.255 scope global dynamic wlp2s0";
    const ROUTE: &str = "default via 192.168.12.1 dev wlp2s0 proto dhcp src 192.168.12.34 metric 600";

    fn healthy_runner() -> FakeCommandRunner {
        FakeCommandRunner::new()
            .on("ip link show wlp2s0", CommandOutput::ok(LINK_UP))
            .on("ip -4 addr show dev wlp2s0", CommandOutput::ok(ADDR))
            .on("ip route show default", CommandOutput::ok(ROUTE))
            .on("ping -c 1 -W 2", CommandOutput::ok("1 packets transmitted, 1 received"))
    }

    fn chain(runner: Arc<FakeCommandRunner>, gateway: Option<&str>) -> PreconditionChain {
        PreconditionChain::new(
            runner,
            "wlp2s0",
            gateway.map(str::to_string),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_all_stages_pass_in_order() {
        let runner = Arc::new(healthy_runner());

        let outcome = chain(runner.clone(), None).run().await;

        match outcome {
            ChainOutcome::Passed(gw) => {
                assert_eq!(gw.ip, "192.168.12.1");
                assert_eq!(gw.dev.as_deref(), Some("wlp2s0"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            runner.call_lines(),
            vec![
                "ip link show wlp2s0",
                "ip -4 addr show dev wlp2s0",
                "ip route show default",
                "ping -c 1 -W 2 192.168.12.1",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_iface_short_circuits() {
        let runner = Arc::new(
            FakeCommandRunner::new()
                .on("ip link show", CommandOutput::failed(1, "Device \"wlp2s0\" does not exist."))
                .on("ping", CommandOutput::ok("")),
        );

        let outcome = chain(runner.clone(), None).run().await;

        match outcome {
            ChainOutcome::Failed { result, gateway } => {
                assert_eq!(result.reason, ReasonCode::IfaceNotFound);
                assert_eq!(result.context["stderr"], "Device \"wlp2s0\" does not exist.");
                assert!(gateway.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(runner.call_count(), 1);
        assert!(!runner.was_called("ping"));
    }

    #[tokio::test]
    async fn test_iface_down_never_probes_gateway() {
        let runner = Arc::new(
            FakeCommandRunner::new()
                .on("ip link show", CommandOutput::ok(LINK_DOWN))
                .on("ip", CommandOutput::ok(ADDR))
                .on("ping", CommandOutput::ok("")),
        );

        let outcome = chain(runner.clone(), Some("192.168.12.1")).run().await;

        assert!(matches!(
            outcome,
            ChainOutcome::Failed { ref result, .. } if result.reason == ReasonCode::IfaceDown
        ));
        assert!(!runner.was_called("ip -4"));
        assert!(!runner.was_called("ping"));
    }

    #[tokio::test]
    async fn test_address_failures() {
        let runner = Arc::new(
            FakeCommandRunner::new()
                .on("ip link show", CommandOutput::ok(LINK_UP))
                .on("ip -4 addr", CommandOutput::ok("3: wlp2s0: <UP> mtu 1500")),
        );
        let result = chain(runner, None).check_address().await;
        assert_eq!(result.reason, ReasonCode::NoIpAddr);

        let runner = Arc::new(
            FakeCommandRunner::new().on("ip -4 addr", CommandOutput::failed(255, "cannot find")),
        );
        let result = chain(runner, None).check_address().await;
        assert_eq!(result.reason, ReasonCode::AddrCmdError);
        assert_eq!(result.context["stderr"], "cannot find");
    }

    #[tokio::test]
    async fn test_no_default_route() {
        let runner = Arc::new(
            FakeCommandRunner::new()
                .on("ip link show", CommandOutput::ok(LINK_UP))
                .on("ip -4 addr", CommandOutput::ok(ADDR))
                .on("ip route show default", CommandOutput::ok(""))
                .on("ping", CommandOutput::ok("")),
        );

        let outcome = chain(runner.clone(), None).run().await;

        assert!(matches!(
            outcome,
            ChainOutcome::Failed { ref result, gateway: None }
                if result.reason == ReasonCode::NoDefaultRoute
        ));
        assert!(!runner.was_called("ping"));
    }

    #[tokio::test]
    async fn test_route_query_error_is_no_default_route() {
        let runner = Arc::new(
            FakeCommandRunner::new().on("ip route", CommandOutput::failed(2, "RTNETLINK answers")),
        );
        let result = chain(runner, None).discover_gateway().await.unwrap_err();
        assert_eq!(result.reason, ReasonCode::NoDefaultRoute);
    }

    #[tokio::test]
    async fn test_configured_gateway_skips_route_query() {
        let runner = Arc::new(healthy_runner());

        let outcome = chain(runner.clone(), Some(" 10.0.0.1 ")).run().await;

        match outcome {
            ChainOutcome::Passed(gw) => {
                assert_eq!(gw.ip, "10.0.0.1");
                assert_eq!(gw.source, GatewaySource::Config);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!runner.was_called("ip route"));
        assert!(runner.was_called("ping -c 1 -W 2 10.0.0.1"));
    }

    #[tokio::test]
    async fn test_empty_override_falls_back_to_route() {
        let runner = Arc::new(healthy_runner());
        let gw = chain(runner.clone(), Some("")).discover_gateway().await.unwrap();
        assert_eq!(gw.source, GatewaySource::Route);
        assert!(runner.was_called("ip route show default"));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_keeps_gateway_and_output() {
        let runner = Arc::new(
            FakeCommandRunner::new()
                .on("ip link show", CommandOutput::ok(LINK_UP))
                .on("ip -4 addr", CommandOutput::ok(ADDR))
                .on("ip route", CommandOutput::ok(ROUTE))
                .on("ping", CommandOutput::new(1, "1 packets transmitted, 0 received", "")),
        );

        let outcome = chain(runner, None).run().await;

        match outcome {
            ChainOutcome::Failed { result, gateway } => {
                assert_eq!(result.reason, ReasonCode::GatewayUnreach);
                assert_eq!(result.context["ping_stdout"], "1 packets transmitted, 0 received");
                assert_eq!(gateway.unwrap().ip, "192.168.12.1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
