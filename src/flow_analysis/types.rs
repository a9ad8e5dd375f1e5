//! Data types shared by the dissector, the extractor and the correlator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one reconstructed connection inside one input chunk.
///
/// The same key may show up in several chunks of a split capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_port: u16,
    pub stream_id: u64,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.src_port, self.stream_id)
    }
}

/// Request body as emitted by the dissector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// The dissector reported no body for this request.
    Absent,
    /// Hex text of the body bytes.
    Hex(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub uri: String,
    pub body: RequestBody,
}

/// One HTTP request event emitted by the dissector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    pub key: FlowKey,
    pub request: CapturedRequest,
}

/// Requests grouped per connection, capture order preserved within each group.
pub type FlowTable = BTreeMap<FlowKey, Vec<CapturedRequest>>;

/// The four fields recognized in request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveField {
    Username,
    Password,
    Phone,
    Name,
}

impl SensitiveField {
    pub const ALL: [SensitiveField; 4] = [
        SensitiveField::Username,
        SensitiveField::Password,
        SensitiveField::Phone,
        SensitiveField::Name,
    ];

    /// Maps a form field name to a recognized field.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "username" => Some(SensitiveField::Username),
            "password" => Some(SensitiveField::Password),
            "phone" => Some(SensitiveField::Phone),
            "name" => Some(SensitiveField::Name),
            _ => None,
        }
    }
}

/// Sensitive values collected for one flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveRecord {
    pub username: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
}

impl SensitiveRecord {
    pub fn get(&self, field: SensitiveField) -> Option<&str> {
        match field {
            SensitiveField::Username => self.username.as_deref(),
            SensitiveField::Password => self.password.as_deref(),
            SensitiveField::Phone => self.phone.as_deref(),
            SensitiveField::Name => self.name.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: SensitiveField) -> &mut Option<String> {
        match field {
            SensitiveField::Username => &mut self.username,
            SensitiveField::Password => &mut self.password,
            SensitiveField::Phone => &mut self.phone,
            SensitiveField::Name => &mut self.name,
        }
    }

    /// Unconditional overwrite: every recognized key replaces the stored
    /// value, an empty value included. Returns how many fields were written.
    pub fn overwrite_from<'a, I>(&mut self, params: I) -> usize
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut written = 0;
        for (key, value) in params {
            if let Some(field) = SensitiveField::from_name(key) {
                *self.slot_mut(field) = Some(value.clone());
                written += 1;
            }
        }
        written
    }

    /// Guarded merge: fields of `incoming` replace ours only when non-empty.
    pub fn merge_guarded(mut self, incoming: &SensitiveRecord) -> SensitiveRecord {
        for field in SensitiveField::ALL {
            if let Some(value) = incoming.get(field).filter(|v| !v.is_empty()) {
                *self.slot_mut(field) = Some(value.to_string());
            }
        }
        self
    }

    /// Non-empty phone number, if one has been seen.
    pub fn known_phone(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        SensitiveField::ALL
            .iter()
            .all(|f| self.get(*f).map_or(true, str::is_empty))
    }
}

/// Final record of one flow, the unit a worker hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResult {
    pub key: FlowKey,
    pub record: SensitiveRecord,
}
