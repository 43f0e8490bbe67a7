//! Group decision normalization and coverage matching.
//!
//! The runtime reports a granted group as loosely shaped JSON. `build_decision`
//! folds it into a canonical [`GroupDecision`]; everything downstream reads
//! only that form. Missing or malformed pieces become "covers nothing".

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::request::{CertificateRequest, GroupedPermissions, Request};

/// Protocol grants carried by a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolAllowance {
    /// Every protocol is allowed.
    All,
    /// Keys as produced by [`protocol_key`].
    Keys(BTreeSet<String>),
}

impl Default for ProtocolAllowance {
    fn default() -> Self {
        Self::Keys(BTreeSet::new())
    }
}

impl ProtocolAllowance {
    pub fn allows(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }
}

/// Certificate grant for one certificate type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRule {
    pub certificate_type: String,
    /// `None` means any field may be disclosed.
    pub fields: Option<BTreeSet<String>>,
}

impl CertificateRule {
    fn covers(&self, certificate_type: &str, fields: &BTreeSet<String>) -> bool {
        if self.certificate_type != certificate_type {
            return false;
        }
        self.fields
            .as_ref()
            .is_none_or(|allowed| fields.is_subset(allowed))
    }
}

/// Canonical allow-set derived from a granted group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDecision {
    pub protocols: ProtocolAllowance,
    pub baskets: BTreeSet<String>,
    pub certificates: Vec<CertificateRule>,
    /// Satoshi ceiling; `None` covers no spending.
    pub spending_up_to: Option<u64>,
}

/// Key identifying a protocol grant.
///
/// Level 2 protocols are scoped per counterparty (`name|counterparty`);
/// lower levels use the bare name.
pub fn protocol_key(security_level: u8, protocol: &str, counterparty: Option<&str>) -> String {
    if security_level == 2 {
        format!("{protocol}|{}", counterparty.unwrap_or_default())
    } else {
        protocol.to_string()
    }
}

/// Normalize a runtime grant payload into a [`GroupDecision`].
///
/// Accepts both the grouped-permission shape (`protocolPermissions`,
/// `basketAccess`, `certificateAccess`, `spendingAuthorization`) and the
/// short aliases (`protocols`, `baskets`, `certificates`, `spending`).
/// Protocol IDs may be `"name"` with a separate `securityLevel`, or the
/// `[level, "name"]` tuple.
pub fn build_decision(granted: &Value) -> GroupDecision {
    let Some(obj) = granted.as_object() else {
        debug!("Grant payload is not an object; decision covers nothing");
        return GroupDecision::default();
    };
    let field = |primary: &str, alias: &str| obj.get(primary).or_else(|| obj.get(alias));

    GroupDecision {
        protocols: field("protocolPermissions", "protocols").map_or_else(
            ProtocolAllowance::default,
            parse_protocols,
        ),
        baskets: field("basketAccess", "baskets")
            .map(parse_baskets)
            .unwrap_or_default(),
        certificates: field("certificateAccess", "certificates")
            .map(parse_certificates)
            .unwrap_or_default(),
        spending_up_to: field("spendingAuthorization", "spending").and_then(parse_spending),
    }
}

fn parse_protocols(value: &Value) -> ProtocolAllowance {
    if value.as_str().is_some_and(|s| s.eq_ignore_ascii_case("all")) {
        return ProtocolAllowance::All;
    }
    let Some(entries) = value.as_array() else {
        debug!("protocolPermissions is neither \"all\" nor a list; ignoring");
        return ProtocolAllowance::default();
    };

    let keys = entries
        .iter()
        .filter_map(|entry| {
            let key = protocol_entry_key(entry);
            if key.is_none() {
                debug!(?entry, "Skipping malformed protocol grant");
            }
            key
        })
        .collect();
    ProtocolAllowance::Keys(keys)
}

fn protocol_entry_key(entry: &Value) -> Option<String> {
    let id = entry.get("protocolID").or_else(|| entry.get("protocol"))?;
    let (level, name) = match id {
        Value::String(name) => (
            entry.get("securityLevel").and_then(as_u64).unwrap_or(0),
            name.as_str(),
        ),
        Value::Array(parts) => (
            parts.first().and_then(as_u64)?,
            parts.get(1).and_then(Value::as_str)?,
        ),
        _ => return None,
    };
    let level = u8::try_from(level).ok()?;
    let counterparty = entry.get("counterparty").and_then(Value::as_str);
    Some(protocol_key(level, name, counterparty))
}

fn parse_baskets(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(name) => Some(name.clone()),
                    other => other.get("basket").and_then(Value::as_str).map(String::from),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_certificates(value: &Value) -> Vec<CertificateRule> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let certificate_type = entry
                .get("type")
                .or_else(|| entry.get("certificateType"))
                .and_then(Value::as_str)?;
            let fields: BTreeSet<String> = match entry.get("fields") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect(),
                Some(Value::Object(map)) => map.keys().cloned().collect(),
                _ => BTreeSet::new(),
            };
            Some(CertificateRule {
                certificate_type: certificate_type.to_string(),
                fields: (!fields.is_empty()).then_some(fields),
            })
        })
        .collect()
}

fn parse_spending(value: &Value) -> Option<u64> {
    match value {
        Value::Object(map) => map.get("amount").and_then(as_u64),
        other => as_u64(other),
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether `request` is already implied by `decision`.
///
/// A `None` decision (deny, dismiss, timeout) covers nothing. Group requests
/// are never covered.
pub fn is_covered(decision: Option<&GroupDecision>, request: &Request) -> bool {
    let Some(decision) = decision else {
        return false;
    };
    match request {
        Request::Basket(r) => r
            .basket
            .as_ref()
            .is_some_and(|b| decision.baskets.contains(b)),
        Request::Certificate(r) => covers_certificate(decision, r),
        Request::Protocol(r) => decision.protocols.allows(&protocol_key(
            r.protocol_security_level,
            &r.protocol_id,
            r.counterparty.as_deref(),
        )),
        Request::Spending(r) => covers_amount(decision, r.authorization_amount),
        Request::Counterparty(r) => covers_bundle(decision, &r.counterparty, &r.permissions),
        Request::Group(_) => false,
    }
}

fn covers_certificate(decision: &GroupDecision, request: &CertificateRequest) -> bool {
    decision
        .certificates
        .iter()
        .any(|rule| rule.covers(&request.certificate_type, &request.fields))
}

fn covers_amount(decision: &GroupDecision, amount: u64) -> bool {
    decision.spending_up_to.is_some_and(|cap| amount <= cap)
}

/// A counterparty bundle is covered only when every entry in it is.
/// Protocol entries without their own counterparty inherit the bundle's.
fn covers_bundle(
    decision: &GroupDecision,
    counterparty: &str,
    bundle: &GroupedPermissions,
) -> bool {
    if bundle.is_empty() {
        return false;
    }
    let spending = bundle
        .spending_authorization
        .as_ref()
        .is_none_or(|s| covers_amount(decision, s.amount));
    let protocols = bundle.protocol_permissions.iter().all(|p| {
        let cp = p.counterparty.as_deref().unwrap_or(counterparty);
        decision
            .protocols
            .allows(&protocol_key(p.security_level, &p.protocol_id, Some(cp)))
    });
    let baskets = bundle
        .basket_access
        .iter()
        .all(|b| decision.baskets.contains(&b.basket));
    let certificates = bundle.certificate_access.iter().all(|c| {
        let fields: BTreeSet<String> = c.fields.iter().cloned().collect();
        decision
            .certificates
            .iter()
            .any(|rule| rule.covers(&c.certificate_type, &fields))
    });
    spending && protocols && baskets && certificates
}
