// Precondition results produced by each stage of the network check chain

use super::diagnostic::ReasonCode;
use serde_json::{Map, Value};

/// Outcome of one precondition stage
///
/// Transient: folded into a diagnostic event on failure, dropped otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct PreconditionResult {
    pub ok: bool,
    pub reason: ReasonCode,
    pub context: Map<String, Value>,
}

impl PreconditionResult {
    pub fn pass() -> Self {
        Self {
            ok: true,
            reason: ReasonCode::Ok,
            context: Map::new(),
        }
    }

    pub fn fail(reason: ReasonCode) -> Self {
        Self {
            ok: false,
            reason,
            context: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Where the gateway address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewaySource {
    Config,
    Route,
}

impl GatewaySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewaySource::Config => "config",
            GatewaySource::Route => "route",
        }
    }
}

/// Default gateway used for the reachability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    pub ip: String,
    /// Device from the route table, unknown when configured explicitly
    pub dev: Option<String>,
    pub source: GatewaySource,
}

impl Gateway {
    pub fn configured(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            dev: None,
            source: GatewaySource::Config,
        }
    }

    /// Parse `ip route show default` output
    ///
    /// Takes the first line shaped like `default via <gw> dev <dev> ...`.
    pub fn from_route_table(output: &str) -> Option<Self> {
        output.lines().find_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 5 && parts[0] == "default" && parts[1] == "via" {
                Some(Self {
                    ip: parts[2].to_string(),
                    dev: Some(parts[4].to_string()),
                    source: GatewaySource::Route,
                })
            } else {
                None
            }
        })
    }

    /// Context keys attached to events once the gateway is known
    pub fn context(&self) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("gateway_ip".to_string(), Value::from(self.ip.as_str()));
        context.insert(
            "gateway_source".to_string(),
            Value::from(self.source.as_str()),
        );
        if let Some(dev) = &self.dev {
            context.insert("gateway_dev".to_string(), Value::from(dev.as_str()));
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table_first_default_wins() {
        let output = "default via 192.168.12.1 dev wlp2s0 proto dhcp metric 600\n\
                      default via 10.0.0.1 dev eth0 proto static";
        let gw = Gateway::from_route_table(output).unwrap();

        assert_eq!(gw.ip, "192.168.12.1");
        assert_eq!(gw.dev.as_deref(), Some("wlp2s0"));
        assert_eq!(gw.source, GatewaySource::Route);
    }

    #[test]
    fn test_route_table_skips_non_via_lines() {
        let output = "default dev wg0 scope link\ndefault via 10.0.0.1 dev eth0";
        let gw = Gateway::from_route_table(output).unwrap();
        assert_eq!(gw.ip, "10.0.0.1");
        assert_eq!(gw.dev.as_deref(), Some("eth0"));
    }

    #[test]
    fn test_route_table_requires_five_tokens() {
        assert!(Gateway::from_route_table("default via 10.0.0.1 dev").is_none());
        assert!(Gateway::from_route_table("").is_none());
    }

    #[test]
    fn test_configured_gateway_context() {
        let context = Gateway::configured("192.168.1.1").context();
        assert_eq!(context["gateway_ip"], "192.168.1.1");
        assert_eq!(context["gateway_source"], "config");
        assert!(!context.contains_key("gateway_dev"));
    }

    #[test]
    fn test_precondition_result_builders() {
        let fail = PreconditionResult::fail(ReasonCode::NoIpAddr).with("ip_addr", "");
        assert!(!fail.ok);
        assert_eq!(fail.reason, ReasonCode::NoIpAddr);
        assert!(fail.context.contains_key("ip_addr"));
        assert!(PreconditionResult::pass().ok);
    }
}
