//! Billing rules, matching, and cost strategies.
//!
//! Rule lookup is a first-match-wins scan over an ordered rule list. The
//! built-in discovery/health/recovery/commit operations are free and public;
//! admin operations are free but gated. Strategy evaluation is pure and
//! synchronous; asset conversion happens in the processor with a prefetched
//! rate.

use serde::{Deserialize, Serialize};

use nuwa_types::amount::{Amount, PicoUsd};

/// How an operation is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum Strategy {
    /// A fixed price per request, in pico-USD.
    PerRequest { price: PicoUsd },
    /// A price per usage unit (e.g. tokens), in pico-USD per unit. The
    /// handler reports the unit count after execution.
    PerUnit { unit_price: PicoUsd },
    /// No charge.
    Free,
}

impl Strategy {
    /// Evaluates the USD cost for `units` usage units.
    pub fn cost(&self, units: u64) -> PicoUsd {
        match self {
            Strategy::PerRequest { price } => *price,
            Strategy::PerUnit { unit_price } => unit_price.saturating_mul(units),
            Strategy::Free => PicoUsd::ZERO,
        }
    }
}

/// A billing rule bound to an operation pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingRule {
    pub id: String,
    /// Operation matcher: exact, or a prefix when it ends with `*`.
    pub pattern: String,
    pub payment_required: bool,
    pub strategy: Strategy,
    pub auth_required: bool,
    pub admin_only: bool,
}

impl BillingRule {
    pub fn per_request(id: impl Into<String>, pattern: impl Into<String>, price: PicoUsd) -> Self {
        BillingRule {
            id: id.into(),
            pattern: pattern.into(),
            payment_required: true,
            strategy: Strategy::PerRequest { price },
            auth_required: true,
            admin_only: false,
        }
    }

    pub fn per_unit(id: impl Into<String>, pattern: impl Into<String>, unit_price: PicoUsd) -> Self {
        BillingRule {
            id: id.into(),
            pattern: pattern.into(),
            payment_required: true,
            strategy: Strategy::PerUnit { unit_price },
            auth_required: true,
            admin_only: false,
        }
    }

    pub fn free(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        BillingRule {
            id: id.into(),
            pattern: pattern.into(),
            payment_required: false,
            strategy: Strategy::Free,
            auth_required: false,
            admin_only: false,
        }
    }

    pub fn with_auth_required(mut self) -> Self {
        self.auth_required = true;
        self
    }

    pub fn with_admin_only(mut self) -> Self {
        self.admin_only = true;
        self.auth_required = true;
        self
    }

    /// Whether this rule matches a normalized operation name.
    pub fn matches(&self, operation: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => operation.starts_with(prefix),
            None => operation == self.pattern,
        }
    }
}

/// An ordered rule list with first-match-wins lookup.
#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<BillingRule>,
}

impl RuleMatcher {
    /// An empty matcher with no rules at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A matcher pre-loaded with the built-in operation rules. Custom rules
    /// appended afterwards are consulted in insertion order.
    pub fn with_builtins() -> Self {
        let rules = vec![
            BillingRule::free("builtin-discovery", "nuwa.discovery"),
            BillingRule::free("builtin-health", "nuwa.health"),
            BillingRule::free("builtin-recovery", "nuwa.recovery").with_auth_required(),
            BillingRule::free("builtin-commit", "nuwa.commit").with_auth_required(),
            BillingRule::free("builtin-subrav-query", "nuwa.subrav.query").with_auth_required(),
            BillingRule::free("builtin-admin", "nuwa.admin.*").with_admin_only(),
        ];
        RuleMatcher { rules }
    }

    pub fn push(&mut self, rule: BillingRule) {
        self.rules.push(rule);
    }

    pub fn and_rule(mut self, rule: BillingRule) -> Self {
        self.push(rule);
        self
    }

    /// The first rule matching `operation`, if any.
    pub fn match_rule(&self, operation: &str) -> Option<&BillingRule> {
        self.rules.iter().find(|rule| rule.matches(operation))
    }

    /// Appends rules declared as a JSON array, in declaration order. This is
    /// how rule tables from service configuration files load.
    pub fn extend_from_json(&mut self, value: serde_json::Value) -> Result<(), serde_json::Error> {
        let rules: Vec<BillingRule> = serde_json::from_value(value)?;
        self.rules.extend(rules);
        Ok(())
    }
}

/// A computed request cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
    pub usd: PicoUsd,
    /// Asset-unit cost, present when a rate was available.
    pub asset: Option<Amount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_costs() {
        assert_eq!(Strategy::Free.cost(1000), PicoUsd::ZERO);
        assert_eq!(
            Strategy::PerRequest { price: PicoUsd(500) }.cost(1000),
            PicoUsd(500)
        );
        assert_eq!(
            Strategy::PerUnit { unit_price: PicoUsd(3) }.cost(7),
            PicoUsd(21)
        );
    }

    #[test]
    fn test_exact_and_prefix_matching() {
        let exact = BillingRule::free("r", "nuwa.health");
        assert!(exact.matches("nuwa.health"));
        assert!(!exact.matches("nuwa.health.extra"));

        let prefix = BillingRule::free("r", "tool/*");
        assert!(prefix.matches("tool/analyze"));
        assert!(prefix.matches("tool/"));
        assert!(!prefix.matches("rpc/tool"));
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = RuleMatcher::empty()
            .and_rule(BillingRule::per_request("specific", "tool/analyze", PicoUsd(100)))
            .and_rule(BillingRule::per_request("catch-all", "tool/*", PicoUsd(999)));
        assert_eq!(matcher.match_rule("tool/analyze").unwrap().id, "specific");
        assert_eq!(matcher.match_rule("tool/other").unwrap().id, "catch-all");
        assert!(matcher.match_rule("rpc/other").is_none());
    }

    #[test]
    fn test_builtin_rules() {
        let matcher = RuleMatcher::with_builtins();

        let discovery = matcher.match_rule("nuwa.discovery").unwrap();
        assert!(!discovery.payment_required);
        assert!(!discovery.auth_required);
        assert!(!discovery.admin_only);

        let recovery = matcher.match_rule("nuwa.recovery").unwrap();
        assert!(!recovery.payment_required);
        assert!(recovery.auth_required);

        let admin = matcher.match_rule("nuwa.admin.claimTrigger").unwrap();
        assert!(!admin.payment_required);
        assert!(admin.admin_only);
        assert!(matcher.match_rule("nuwa.admin.status").unwrap().admin_only);
    }

    #[test]
    fn test_rules_from_json() {
        let mut matcher = RuleMatcher::with_builtins();
        matcher
            .extend_from_json(serde_json::json!([
                {
                    "id": "chat",
                    "pattern": "tool/chat",
                    "paymentRequired": true,
                    "strategy": { "kind": "perUnit", "unitPrice": 2000 },
                    "authRequired": true,
                    "adminOnly": false
                },
                {
                    "id": "catch-all",
                    "pattern": "tool/*",
                    "paymentRequired": true,
                    "strategy": { "kind": "perRequest", "price": 500 },
                    "authRequired": true,
                    "adminOnly": false
                }
            ]))
            .unwrap();
        let chat = matcher.match_rule("tool/chat").unwrap();
        assert_eq!(chat.strategy, Strategy::PerUnit { unit_price: PicoUsd(2000) });
        let other = matcher.match_rule("tool/other").unwrap();
        assert_eq!(other.strategy, Strategy::PerRequest { price: PicoUsd(500) });
    }

    #[test]
    fn test_custom_rules_after_builtins() {
        let matcher = RuleMatcher::with_builtins()
            .and_rule(BillingRule::per_unit("llm", "tool/chat", PicoUsd(2_000_000)));
        let rule = matcher.match_rule("tool/chat").unwrap();
        assert!(rule.payment_required);
        assert_eq!(rule.strategy.cost(10), PicoUsd(20_000_000));
    }
}
