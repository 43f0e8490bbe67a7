//! Permission request model.
//!
//! One variant per request kind the wallet runtime can raise. Field names
//! follow the runtime's camelCase wire shape.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The six request kinds, one typed queue each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Basket,
    Certificate,
    Protocol,
    Spending,
    Counterparty,
    Group,
}

impl RequestKind {
    /// Every kind, in queue index order.
    pub const ALL: [Self; 6] = [
        Self::Basket,
        Self::Certificate,
        Self::Protocol,
        Self::Spending,
        Self::Counterparty,
        Self::Group,
    ];

    /// Kinds that are held back while a group negotiation is pending.
    pub const DEFERRABLE: [Self; 5] = [
        Self::Basket,
        Self::Certificate,
        Self::Protocol,
        Self::Spending,
        Self::Counterparty,
    ];

    /// Stable index into per-kind arrays.
    pub const fn index(self) -> usize {
        match self {
            Self::Basket => 0,
            Self::Certificate => 1,
            Self::Protocol => 2,
            Self::Spending => 3,
            Self::Counterparty => 4,
            Self::Group => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basket => "basket",
            Self::Certificate => "certificate",
            Self::Protocol => "protocol",
            Self::Spending => "spending",
            Self::Counterparty => "counterparty",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Runtime-issued identifier, unique across all kinds at any instant.
    #[serde(rename = "requestID")]
    pub request_id: String,
    /// Identifier of the calling application.
    pub originator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Re-request of an expiring grant.
    #[serde(default)]
    pub renewal: bool,
}

impl RequestMeta {
    pub fn new(request_id: impl Into<String>, originator: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            originator: originator.into(),
            reason: None,
            renewal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketRequest {
    #[serde(flatten)]
    pub meta: RequestMeta,
    #[serde(default)]
    pub basket: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    #[serde(flatten)]
    pub meta: RequestMeta,
    pub certificate_type: String,
    /// Field names being disclosed.
    #[serde(default)]
    pub fields: BTreeSet<String>,
    pub verifier_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolRequest {
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// 0, 1 or 2. Level 2 is scoped per counterparty.
    pub protocol_security_level: u8,
    #[serde(rename = "protocolID")]
    pub protocol_id: String,
    #[serde(default)]
    pub counterparty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub satoshis: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingRequest {
    #[serde(flatten)]
    pub meta: RequestMeta,
    /// Satoshis.
    pub authorization_amount: u64,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartyRequest {
    #[serde(flatten)]
    pub meta: RequestMeta,
    pub counterparty: String,
    #[serde(default)]
    pub counterparty_label: Option<String>,
    #[serde(default)]
    pub permissions: GroupedPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    #[serde(flatten)]
    pub meta: RequestMeta,
    #[serde(default)]
    pub permissions: GroupedPermissions,
}

/// Bundle of permissions negotiated in one prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_authorization: Option<SpendingAuthorization>,
    #[serde(default)]
    pub protocol_permissions: Vec<ProtocolPermission>,
    #[serde(default)]
    pub basket_access: Vec<BasketAccess>,
    #[serde(default)]
    pub certificate_access: Vec<CertificateAccess>,
}

impl GroupedPermissions {
    pub fn is_empty(&self) -> bool {
        self.spending_authorization.is_none()
            && self.protocol_permissions.is_empty()
            && self.basket_access.is_empty()
            && self.certificate_access.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingAuthorization {
    pub amount: u64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolPermission {
    pub security_level: u8,
    #[serde(rename = "protocolID")]
    pub protocol_id: String,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketAccess {
    pub basket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAccess {
    pub verifier_public_key: String,
    #[serde(rename = "type")]
    pub certificate_type: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A permission request as surfaced by the wallet runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Request {
    Basket(BasketRequest),
    Certificate(CertificateRequest),
    Protocol(ProtocolRequest),
    Spending(SpendingRequest),
    Counterparty(CounterpartyRequest),
    Group(GroupRequest),
}

impl Request {
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Basket(_) => RequestKind::Basket,
            Self::Certificate(_) => RequestKind::Certificate,
            Self::Protocol(_) => RequestKind::Protocol,
            Self::Spending(_) => RequestKind::Spending,
            Self::Counterparty(_) => RequestKind::Counterparty,
            Self::Group(_) => RequestKind::Group,
        }
    }

    pub const fn meta(&self) -> &RequestMeta {
        match self {
            Self::Basket(r) => &r.meta,
            Self::Certificate(r) => &r.meta,
            Self::Protocol(r) => &r.meta,
            Self::Spending(r) => &r.meta,
            Self::Counterparty(r) => &r.meta,
            Self::Group(r) => &r.meta,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.meta().request_id
    }

    pub fn originator(&self) -> &str {
        &self.meta().originator
    }
}

impl From<BasketRequest> for Request {
    fn from(r: BasketRequest) -> Self {
        Self::Basket(r)
    }
}

impl From<CertificateRequest> for Request {
    fn from(r: CertificateRequest) -> Self {
        Self::Certificate(r)
    }
}

impl From<ProtocolRequest> for Request {
    fn from(r: ProtocolRequest) -> Self {
        Self::Protocol(r)
    }
}

impl From<SpendingRequest> for Request {
    fn from(r: SpendingRequest) -> Self {
        Self::Spending(r)
    }
}

impl From<CounterpartyRequest> for Request {
    fn from(r: CounterpartyRequest) -> Self {
        Self::Counterparty(r)
    }
}

impl From<GroupRequest> for Request {
    fn from(r: GroupRequest) -> Self {
        Self::Group(r)
    }
}
