//! Immutable channel records and their merge rules
//!
//! A [`ChannelRecord`] holds whatever attributes the upstream payloads carried
//! plus a [`ChannelSources`] provenance bitset. Records never change after
//! construction: loading more data or merging two records always yields a new
//! value, so the catalog can hand out shared references while refreshes run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use tracing::{trace, warn};
use url::Url;

use crate::errors::{CatalogError, CatalogResult};

/// Canonical attribute keys with defined semantics
pub mod keys {
    /// Primary identifier (the device's service id)
    pub const SID: &str = "sid";
    /// Display number
    pub const NUMBER: &str = "c";
    /// Display title
    pub const TITLE: &str = "t";
    /// Picture quality (`hd`, `sd`, `au`)
    pub const QUALITY: &str = "sf";
    /// Short channel description
    pub const DESCRIPTION: &str = "upgradeMessage";
    pub const TIMESHIFTED: &str = "timeshifted";
    pub const ADULT: &str = "adult";
    pub const XMLTV_ID: &str = "xmltv_id";
    pub const XMLTV_DISPLAY_NAME: &str = "xmltv_display_name";
    pub const XMLTV_ICON_URL: &str = "xmltv_icon_url";
}

/// Human friendly names mapped onto the device's terse keys
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("name", keys::TITLE),
    ("number", keys::NUMBER),
    ("quality", keys::QUALITY),
    ("id", keys::SID),
    ("desc", keys::DESCRIPTION),
];

/// Fields where a defined value beats an undefined one regardless of merge order
pub const MERGE_EXCEPTION_FIELDS: &[&str] =
    &[keys::SID, keys::NUMBER, keys::TITLE, keys::XMLTV_ID];

/// Tag written into serialized records
pub const CHANNEL_TYPE_TAG: &str = "channel";

/// Bitset of the upstream systems that contributed to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelSources(u8);

impl ChannelSources {
    pub const NONE: Self = Self(0);
    pub const DEVICE_SUMMARY: Self = Self(0b001);
    pub const DEVICE_DETAIL: Self = Self(0b010);
    pub const XMLTV: Self = Self(0b100);

    const ALL_BITS: u8 = 0b111;
    const NAMES: [(Self, &'static str); 3] = [
        (Self::DEVICE_SUMMARY, "DEVICE_SUMMARY"),
        (Self::DEVICE_DETAIL, "DEVICE_DETAIL"),
        (Self::XMLTV, "XMLTV"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, rejecting unknown flags
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL_BITS == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ChannelSources {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChannelSources {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ChannelSources {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ChannelSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// A single attribute value from an upstream payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrValue {
    /// Explicit null from the payload; treated as "not present"
    Null,
    Text(String),
    Integer(i64),
    Bool(bool),
    Url(Url),
}

impl AttrValue {
    /// Convert a JSON payload value. Arrays and objects have no attribute form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Text(n.to_string()),
            }),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the value as text; URLs render as their string form
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Url(u) => Some(u.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Self::Url(u) => Some(u),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Url(u) => write!(f, "{u}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Url> for AttrValue {
    fn from(value: Url) -> Self {
        Self::Url(value)
    }
}

/// One `<channel>` element from an XMLTV document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmltvChannel {
    pub id: String,
    pub display_names: Vec<String>,
    pub icon_src: Option<String>,
}

impl XmltvChannel {
    /// The name the feed leads with; used as the record's display name
    pub fn primary_display_name(&self) -> Option<&str> {
        self.display_names.first().map(String::as_str)
    }
}

/// Immutable, provenance-tracked channel data
///
/// Equality and hashing cover both the attributes and the sources, so two
/// records describing the same channel from different feeds are not equal.
/// Matching "the same real-world channel" is done explicitly by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawChannelRecord", into = "RawChannelRecord")]
pub struct ChannelRecord {
    attributes: BTreeMap<String, AttrValue>,
    sources: ChannelSources,
}

/// Wire form of a record, tagged so foreign JSON is rejected
#[derive(Serialize, Deserialize)]
struct RawChannelRecord {
    #[serde(rename = "__type__")]
    type_tag: String,
    attributes: BTreeMap<String, AttrValue>,
    sources: u8,
}

impl TryFrom<RawChannelRecord> for ChannelRecord {
    type Error = CatalogError;

    fn try_from(raw: RawChannelRecord) -> Result<Self, Self::Error> {
        if raw.type_tag != CHANNEL_TYPE_TAG {
            return Err(CatalogError::malformed(format!(
                "unexpected type tag '{}'",
                raw.type_tag
            )));
        }
        let sources = ChannelSources::from_bits(raw.sources).ok_or_else(|| {
            CatalogError::malformed(format!("unknown source flags {:#05b}", raw.sources))
        })?;
        Ok(Self {
            attributes: raw.attributes,
            sources,
        })
    }
}

impl From<ChannelRecord> for RawChannelRecord {
    fn from(record: ChannelRecord) -> Self {
        Self {
            type_tag: CHANNEL_TYPE_TAG.to_string(),
            attributes: record.attributes,
            sources: record.sources.bits(),
        }
    }
}

impl ChannelRecord {
    /// Build a record directly from parts
    pub fn from_parts(attributes: BTreeMap<String, AttrValue>, sources: ChannelSources) -> Self {
        Self {
            attributes,
            sources,
        }
    }

    /// Create a record from one entry of the device's `/as/services` list
    pub fn from_device_summary(payload: &serde_json::Map<String, Value>) -> Self {
        Self::default().load_device_summary(payload)
    }

    /// Create a new record with a device detail payload layered onto `existing`
    ///
    /// The device nests the interesting fields under `details`; a payload
    /// without that wrapper is used as-is.
    pub fn from_device_detail(existing: &ChannelRecord, payload: &Value) -> Self {
        let details = payload
            .get("details")
            .and_then(Value::as_object)
            .or_else(|| payload.as_object());

        let mut attributes = existing.attributes.clone();
        match details {
            Some(details) => extend_from_payload(&mut attributes, details),
            None => warn!(
                "Detail payload for channel {:?} is not an object; ignoring",
                existing.sid()
            ),
        }

        Self {
            attributes,
            sources: existing.sources | ChannelSources::DEVICE_DETAIL,
        }
    }

    /// Create a record from an XMLTV `<channel>` fragment
    ///
    /// The icon `src` is resolved against `base_url`, so relative icon paths
    /// in a feed become absolute URLs.
    pub fn from_xmltv_element(channel: &XmltvChannel, base_url: &Url) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            keys::XMLTV_ID.to_string(),
            AttrValue::Text(channel.id.clone()),
        );

        if let Some(name) = channel.primary_display_name() {
            attributes.insert(
                keys::XMLTV_DISPLAY_NAME.to_string(),
                AttrValue::Text(name.to_string()),
            );
        }

        if let Some(src) = &channel.icon_src {
            match base_url.join(src) {
                Ok(icon) => {
                    attributes.insert(keys::XMLTV_ICON_URL.to_string(), AttrValue::Url(icon));
                }
                Err(e) => warn!(
                    "Ignoring unresolvable icon '{}' on XMLTV channel '{}': {}",
                    src, channel.id, e
                ),
            }
        }

        Self {
            attributes,
            sources: ChannelSources::XMLTV,
        }
    }

    /// Return a new record with summary data layered on top of this one
    pub fn load_device_summary(&self, payload: &serde_json::Map<String, Value>) -> Self {
        let mut attributes = self.attributes.clone();
        extend_from_payload(&mut attributes, payload);
        Self {
            attributes,
            sources: self.sources | ChannelSources::DEVICE_SUMMARY,
        }
    }

    /// Merge `other` into a copy of this record; see [`merge_channels`]
    pub fn merge(&self, other: &ChannelRecord) -> Self {
        merge_channels(self, other)
    }

    pub fn sources(&self) -> ChannelSources {
        self.sources
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    /// Look up an attribute by raw key or friendly alias
    ///
    /// Returns `None` when the attribute is absent or explicitly null.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        let value = match self.attributes.get(name) {
            Some(value) => Some(value),
            None => resolve_alias(name).and_then(|key| self.attributes.get(key)),
        };
        value.filter(|v| !v.is_null())
    }

    /// Text form of an attribute, if it is textual
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_str)
    }

    pub fn sid(&self) -> Option<&str> {
        self.text(keys::SID)
    }

    pub fn number(&self) -> Option<&str> {
        self.text(keys::NUMBER)
    }

    pub fn title(&self) -> Option<&str> {
        self.text(keys::TITLE)
    }

    pub fn quality(&self) -> Option<&str> {
        self.text(keys::QUALITY)
    }

    pub fn description(&self) -> Option<&str> {
        self.text(keys::DESCRIPTION)
    }

    pub fn xmltv_id(&self) -> Option<&str> {
        self.text(keys::XMLTV_ID)
    }

    pub fn xmltv_display_name(&self) -> Option<&str> {
        self.text(keys::XMLTV_DISPLAY_NAME)
    }

    pub fn xmltv_icon_url(&self) -> Option<&Url> {
        self.get(keys::XMLTV_ICON_URL).and_then(AttrValue::as_url)
    }

    /// `+1` style channels; the device only sends the flag when it is true
    pub fn is_timeshifted(&self) -> bool {
        self.get(keys::TIMESHIFTED)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }

    pub fn is_adult(&self) -> bool {
        self.get(keys::ADULT)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }

    /// Serialize to the tagged JSON form
    pub fn to_json(&self) -> CatalogResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CatalogError::malformed(format!("failed to serialize channel: {e}")))
    }

    /// Deserialize from the tagged JSON form
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        serde_json::from_str(json).map_err(|e| CatalogError::malformed(e.to_string()))
    }
}

impl fmt::Display for ChannelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<&str>| v.unwrap_or("None").to_string();
        write!(
            f,
            "<Channel: sources={}, id={}, xmltv_id={}, number={}, name={}>",
            self.sources,
            show(self.sid()),
            show(self.xmltv_id()),
            show(self.number()),
            show(self.title()),
        )
    }
}

/// Map a friendly accessor name to its canonical key
pub fn resolve_alias(name: &str) -> Option<&'static str> {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, key)| *key)
}

/// Merge two records into a new one
///
/// The attribute maps are unioned with `b` winning key collisions, except for
/// [`MERGE_EXCEPTION_FIELDS`]: there a defined value always beats an absent or
/// null one, whichever side it comes from. Sources are ORed together.
///
/// No check is made that the two records describe the same channel; callers
/// match on display name first.
pub fn merge_channels(a: &ChannelRecord, b: &ChannelRecord) -> ChannelRecord {
    let mut attributes = a.attributes.clone();
    attributes.extend(b.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

    for key in MERGE_EXCEPTION_FIELDS {
        let a_value = a.attributes.get(*key).filter(|v| !v.is_null());
        let b_value = b.attributes.get(*key).filter(|v| !v.is_null());
        match (a_value, b_value) {
            (Some(value), None) | (None, Some(value)) => {
                attributes.insert((*key).to_string(), value.clone());
            }
            _ => {}
        }
    }

    ChannelRecord {
        attributes,
        sources: a.sources | b.sources,
    }
}

fn extend_from_payload(
    attributes: &mut BTreeMap<String, AttrValue>,
    payload: &serde_json::Map<String, Value>,
) {
    for (key, value) in payload {
        match AttrValue::from_json(value) {
            // The catalog keys on the textual sid
            Some(AttrValue::Integer(n)) if key == keys::SID => {
                attributes.insert(key.clone(), AttrValue::Text(n.to_string()));
            }
            Some(attr) => {
                attributes.insert(key.clone(), attr);
            }
            None => trace!("Skipping nested payload field '{}'", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn summary(value: Value) -> ChannelRecord {
        ChannelRecord::from_device_summary(value.as_object().unwrap())
    }

    fn bbc_one() -> ChannelRecord {
        summary(json!({
            "c": "101",
            "dvbtriplet": "2.2045.6301",
            "schedule": true,
            "servicetype": "DSAT",
            "sf": "sd",
            "sg": 12,
            "sid": "2002",
            "sk": 2002,
            "t": "BBC One Lon",
            "xsg": 3
        }))
    }

    fn bbc_one_xmltv() -> ChannelRecord {
        let xml = XmltvChannel {
            id: "f3932e75f691561adbe3b68a010af7a3".to_string(),
            display_names: vec!["BBC One Lon".to_string()],
            icon_src: Some("/images/channels/f3932e75f691561adbe3b68a010af7a3.png".to_string()),
        };
        ChannelRecord::from_xmltv_element(&xml, &Url::parse("http://www.xmltv.co.uk/").unwrap())
    }

    #[test]
    fn test_blank_record() {
        let blank = ChannelRecord::default();
        assert_eq!(blank.sources(), ChannelSources::NONE);
        assert_eq!(blank.sid(), None);
        assert_eq!(blank.get("blah"), None);
        assert_eq!(blank.get("isbroadcasting"), None);
        assert_eq!(
            blank.to_string(),
            "<Channel: sources=NONE, id=None, xmltv_id=None, number=None, name=None>"
        );
    }

    #[test]
    fn test_from_device_summary() {
        let chan = bbc_one();
        assert_eq!(chan.sources(), ChannelSources::DEVICE_SUMMARY);
        assert_eq!(chan.sid(), Some("2002"));
        assert_eq!(chan.text("id"), Some("2002"));
        assert_eq!(chan.text("name"), Some("BBC One Lon"));
        assert_eq!(chan.text("number"), Some("101"));
        assert_eq!(chan.text("quality"), Some("sd"));
        assert_eq!(chan.get("sk"), Some(&AttrValue::Integer(2002)));
        assert_eq!(chan.get("schedule"), Some(&AttrValue::Bool(true)));
        assert!(!chan.is_timeshifted());
    }

    #[test]
    fn test_numeric_sid_is_stored_as_text() {
        let chan = summary(json!({"sid": 2002, "t": "BBC One Lon"}));
        assert_eq!(chan.sid(), Some("2002"));
        assert_eq!(chan.get("sid"), Some(&AttrValue::Text("2002".to_string())));
    }

    #[test]
    fn test_from_device_detail_is_a_new_record() {
        let chan = bbc_one();
        let detail = json!({
            "details": {
                "dvbtriplet": "2.2045.6301",
                "isbroadcasting": true,
                "upgradeMessage": "BBC ONE for Greater London and the surrounding area."
            },
            "sid": "2002",
            "streamingprofiles": [{"name": "AnExample"}]
        });

        let detailed = ChannelRecord::from_device_detail(&chan, &detail);

        assert_eq!(chan.get("isbroadcasting"), None);
        assert_eq!(detailed.get("isbroadcasting"), Some(&AttrValue::Bool(true)));
        assert_eq!(
            detailed.text("desc"),
            Some("BBC ONE for Greater London and the surrounding area.")
        );
        assert_eq!(detailed.get("streamingprofiles"), None);
        assert_eq!(
            detailed.sources(),
            ChannelSources::DEVICE_SUMMARY | ChannelSources::DEVICE_DETAIL
        );
    }

    #[test]
    fn test_from_xmltv_element_resolves_icon() {
        let chan = bbc_one_xmltv();
        assert_eq!(chan.sources(), ChannelSources::XMLTV);
        assert_eq!(chan.xmltv_id(), Some("f3932e75f691561adbe3b68a010af7a3"));
        assert_eq!(chan.xmltv_display_name(), Some("BBC One Lon"));
        assert_eq!(
            chan.xmltv_icon_url().map(Url::as_str),
            Some("http://www.xmltv.co.uk/images/channels/f3932e75f691561adbe3b68a010af7a3.png")
        );
        assert_eq!(chan.sid(), None);
    }

    #[test]
    fn test_merge_keeps_device_identity_and_adds_xmltv() {
        let merged = merge_channels(&bbc_one(), &bbc_one_xmltv());
        assert_eq!(merged.sid(), Some("2002"));
        assert_eq!(merged.title(), Some("BBC One Lon"));
        assert_eq!(merged.xmltv_id(), Some("f3932e75f691561adbe3b68a010af7a3"));
        assert_eq!(
            merged.sources(),
            ChannelSources::DEVICE_SUMMARY | ChannelSources::XMLTV
        );
    }

    #[test]
    fn test_merge_generic_fields_last_wins() {
        let a = summary(json!({"sid": "1", "sf": "sd"}));
        let b = summary(json!({"sid": "1", "sf": "hd"}));
        assert_eq!(merge_channels(&a, &b).quality(), Some("hd"));
        assert_eq!(merge_channels(&b, &a).quality(), Some("sd"));
    }

    #[test]
    fn test_merge_exception_fields_ignore_null() {
        let a = summary(json!({"sid": "2002", "t": "BBC One Lon", "c": "101"}));
        let b = summary(json!({"sid": null, "t": null, "c": null, "xmltv_id": "abc"}));

        for merged in [merge_channels(&a, &b), merge_channels(&b, &a)] {
            assert_eq!(merged.sid(), Some("2002"));
            assert_eq!(merged.title(), Some("BBC One Lon"));
            assert_eq!(merged.number(), Some("101"));
            assert_eq!(merged.xmltv_id(), Some("abc"));
        }
    }

    #[test]
    fn test_merge_generic_null_overrides() {
        let a = summary(json!({"sid": "1", "sf": "hd"}));
        let b = summary(json!({"sf": null}));
        assert_eq!(merge_channels(&a, &b).quality(), None);
    }

    #[test]
    fn test_json_round_trip() {
        let chan = merge_channels(&bbc_one(), &bbc_one_xmltv());
        let json = chan.to_json().unwrap();
        assert!(json.contains("\"__type__\": \"channel\""));
        assert_eq!(ChannelRecord::from_json(&json).unwrap(), chan);
    }

    #[test]
    fn test_from_json_rejects_missing_type_tag() {
        let err = ChannelRecord::from_json(r#"{"attributes": {}, "sources": 1}"#).unwrap_err();
        assert!(matches!(err, CatalogError::MalformedRecord { .. }));

        let err = ChannelRecord::from_json(r#"{"__type__": "programme", "attributes": {}, "sources": 1}"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::MalformedRecord { .. }));

        let err = ChannelRecord::from_json(r#"{"__type__": "channel", "attributes": {}, "sources": 64}"#)
            .unwrap_err();
        assert!(matches!(err, CatalogError::MalformedRecord { .. }));
    }

    #[test]
    fn test_sources_display() {
        assert_eq!(ChannelSources::NONE.to_string(), "NONE");
        assert_eq!(
            (ChannelSources::DEVICE_SUMMARY | ChannelSources::XMLTV).to_string(),
            "DEVICE_SUMMARY|XMLTV"
        );
    }

    fn arb_value() -> impl Strategy<Value = AttrValue> {
        prop_oneof![
            Just(AttrValue::Null),
            "[a-z ]{0,8}".prop_map(AttrValue::Text),
            any::<i64>().prop_map(AttrValue::Integer),
            any::<bool>().prop_map(AttrValue::Bool),
        ]
    }

    fn arb_record() -> impl Strategy<Value = ChannelRecord> {
        let key = prop_oneof![
            Just("sid".to_string()),
            Just("c".to_string()),
            Just("t".to_string()),
            Just("xmltv_id".to_string()),
            Just("sf".to_string()),
            "[a-z]{1,4}",
        ];
        (
            proptest::collection::btree_map(key, arb_value(), 0..8),
            0u8..8,
        )
            .prop_map(|(attributes, bits)| {
                ChannelRecord::from_parts(attributes, ChannelSources::from_bits(bits).unwrap())
            })
    }

    proptest! {
        #[test]
        fn prop_merge_ors_sources(a in arb_record(), b in arb_record()) {
            prop_assert_eq!(merge_channels(&a, &b).sources(), a.sources() | b.sources());
        }

        #[test]
        fn prop_defined_sid_survives_either_order(a in arb_record(), sid in "[0-9]{1,5}") {
            let mut attributes = a.attributes().clone();
            attributes.insert(keys::SID.to_string(), AttrValue::Text(sid.clone()));
            let with_sid = ChannelRecord::from_parts(attributes, a.sources());

            let mut attributes = a.attributes().clone();
            attributes.insert(keys::SID.to_string(), AttrValue::Null);
            let without_sid = ChannelRecord::from_parts(attributes, a.sources());

            let forward = merge_channels(&with_sid, &without_sid);
            let reversed = merge_channels(&without_sid, &with_sid);
            prop_assert_eq!(forward.sid(), Some(sid.as_str()));
            prop_assert_eq!(reversed.sid(), Some(sid.as_str()));
        }

        #[test]
        fn prop_merge_with_self_is_identity(a in arb_record()) {
            prop_assert_eq!(merge_channels(&a, &a), a);
        }

        #[test]
        fn prop_json_round_trip(a in arb_record()) {
            let json = a.to_json().unwrap();
            prop_assert_eq!(ChannelRecord::from_json(&json).unwrap(), a);
        }
    }
}
