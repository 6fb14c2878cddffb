use std::fmt;
use std::marker::PhantomData;

use chrono::Utc;
use loro::awareness::EphemeralStore;
use loro::ContainerID;
use serde::de::{DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::RelayError;

/// How far ahead of the local clock a remote entry may be stamped.
pub const MAX_CLOCK_SKEW_MS: i64 = 5_000;

/// Nesting limit for values inside a presence update.
const MAX_VALUE_DEPTH: usize = 512;

/// Presence (awareness) state for one `documentId`: cursors, selections,
/// user metadata. Entries expire after the configured timeout.
pub struct Presence {
    store: EphemeralStore,
    timeout_ms: i64,
}

impl Presence {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            store: EphemeralStore::new(timeout_ms),
            timeout_ms,
        }
    }

    /// Apply an update received from a remote peer.
    ///
    /// The update is decoded and checked before the store sees it: every
    /// entry must be stamped within `[now - timeout, now + MAX_CLOCK_SKEW_MS]`,
    /// otherwise the whole update is rejected.
    pub fn apply_remote(&self, update: &[u8]) -> Result<(), RelayError> {
        if update.is_empty() {
            return Err(RelayError::PresenceUpdate("empty update".to_string()));
        }
        check_entries(update, self.timeout_ms, Utc::now().timestamp_millis())?;
        self.store
            .apply(update)
            .map_err(|e| RelayError::PresenceUpdate(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.store.get_all_states().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encode_all(&self) -> Vec<u8> {
        self.store.encode_all()
    }

    /// Drop entries that have not been refreshed within the timeout.
    pub fn remove_outdated(&self) -> usize {
        let before = self.len();
        self.store.remove_outdated();
        before.saturating_sub(self.len())
    }

    pub fn dispose(self) {
        let entries = self.len();
        drop(self.store);
        debug!(entries, "presence state disposed");
    }
}

/// Decode `update` and check each entry's timestamp against `now`.
/// Returns the number of entries.
fn check_entries(update: &[u8], timeout_ms: i64, now: i64) -> Result<usize, RelayError> {
    let entries: Vec<EncodedEntry<'_>> = postcard::from_bytes(update)
        .map_err(|e| RelayError::PresenceUpdate(format!("undecodable update: {e}")))?;
    let oldest = now.saturating_sub(timeout_ms);
    let newest = now.saturating_add(MAX_CLOCK_SKEW_MS);
    if let Some(entry) = entries.iter().find(|e| !(oldest..=newest).contains(&e.timestamp)) {
        return Err(RelayError::PresenceUpdate(format!(
            "entry {:?} stamped {} outside [{oldest}, {newest}]",
            entry.key, entry.timestamp
        )));
    }
    Ok(entries.len())
}

/// One entry of an encoded presence update. Values are walked for shape and
/// nesting depth only, never materialized.
#[derive(Deserialize)]
struct EncodedEntry<'a> {
    #[serde(borrow)]
    key: &'a str,
    _value: Option<ValueShape>,
    timestamp: i64,
}

struct ValueShape;

impl<'de> Deserialize<'de> for ValueShape {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        ValueSeed { remaining_depth: MAX_VALUE_DEPTH }.deserialize(deserializer)
    }
}

#[derive(Deserialize)]
enum ValueKind {
    Null,
    Bool,
    Double,
    I32,
    String,
    List,
    Map,
    Container,
    Binary,
}

const VALUE_VARIANTS: &[&str] = &[
    "Null", "Bool", "Double", "I32", "String", "List", "Map", "Container", "Binary",
];

#[derive(Clone, Copy)]
struct ValueSeed {
    remaining_depth: usize,
}

impl ValueSeed {
    fn nested<E: serde::de::Error>(self) -> Result<Self, E> {
        let remaining_depth = self
            .remaining_depth
            .checked_sub(1)
            .ok_or_else(|| E::custom("value nested too deeply"))?;
        Ok(Self { remaining_depth })
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = ValueShape;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_enum("LoroValue", VALUE_VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = ValueShape;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a presence value")
    }

    fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
    where
        A: EnumAccess<'de>,
    {
        let (kind, variant) = data.variant::<ValueKind>()?;
        match kind {
            ValueKind::Null => variant.unit_variant()?,
            ValueKind::Bool => variant.newtype_variant::<bool>().map(drop)?,
            ValueKind::Double => variant.newtype_variant::<f64>().map(drop)?,
            ValueKind::I32 => variant.newtype_variant::<i64>().map(drop)?,
            ValueKind::String => variant.newtype_variant::<&'de str>().map(drop)?,
            ValueKind::List => variant.newtype_variant_seed(ListSeed(self.nested()?))?,
            ValueKind::Map => variant.newtype_variant_seed(MapSeed(self.nested()?))?,
            ValueKind::Container => variant.newtype_variant::<ContainerID>().map(drop)?,
            ValueKind::Binary => variant.newtype_variant::<Vec<u8>>().map(drop)?,
        }
        Ok(ValueShape)
    }
}

struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a list of presence values")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element_seed(self.0)?.is_some() {}
        Ok(())
    }
}

struct MapSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for MapSeed {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for MapSeed {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of presence values")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while map.next_entry_seed(PhantomData::<&'de str>, self.0)?.is_some() {}
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use loro::LoroValue;
    use serde::Serialize;
    use std::time::Duration;

    pub(crate) fn cursor_update(user: &str, cursor: i64) -> Vec<u8> {
        let store = EphemeralStore::new(30_000);
        store.set(user, cursor);
        store.encode(user)
    }

    #[derive(Serialize)]
    struct Stamped<'a> {
        key: &'a str,
        value: Option<LoroValue>,
        timestamp: i64,
    }

    /// A single-entry update carrying an arbitrary timestamp.
    pub(crate) fn stamped_update(key: &str, value: LoroValue, timestamp: i64) -> Vec<u8> {
        postcard::to_allocvec(&vec![Stamped {
            key,
            value: Some(value),
            timestamp,
        }])
        .unwrap()
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    #[test]
    fn remote_updates_populate_the_store() {
        let presence = Presence::new(30_000);
        assert!(presence.is_empty());

        presence.apply_remote(&cursor_update("alice", 3)).unwrap();
        presence.apply_remote(&cursor_update("bob", 9)).unwrap();
        assert_eq!(presence.len(), 2);

        let replica = EphemeralStore::new(30_000);
        replica.apply(&presence.encode_all()).unwrap();
        assert_eq!(replica.get("alice"), Some(LoroValue::from(3i64)));
    }

    #[test]
    fn garbage_is_rejected() {
        let presence = Presence::new(30_000);
        assert!(presence.apply_remote(&[]).is_err());
        assert!(presence.apply_remote(&[0xff, 0xff, 0xff]).is_err());
        assert!(presence.is_empty());
    }

    #[test]
    fn stale_entries_are_swept() {
        let presence = Presence::new(50);
        presence.apply_remote(&cursor_update("alice", 1)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(presence.remove_outdated(), 1);
        assert!(presence.is_empty());
    }

    #[test]
    fn structured_values_stamped_now_are_accepted() {
        let presence = Presence::new(30_000);
        let value: LoroValue = serde_json::from_value::<LoroValue>(serde_json::json!({
            "name": "alice",
            "cursor": {"anchor": 3, "head": 7},
            "colors": ["#f00", 1.5, true, null],
        }))
        .unwrap();
        presence.apply_remote(&stamped_update("alice", value, now())).unwrap();
        presence
            .apply_remote(&stamped_update("bob", LoroValue::Binary(vec![1, 2, 3].into()), now()))
            .unwrap();
        assert_eq!(presence.len(), 2);
    }

    #[test]
    fn far_future_stamp_is_rejected() {
        let presence = Presence::new(1_000);
        assert!(presence.apply_remote(&stamped_update("mallory", LoroValue::from(1i64), i64::MAX)).is_err());
        assert!(presence
            .apply_remote(&stamped_update("mallory", LoroValue::from(1i64), now() + MAX_CLOCK_SKEW_MS + 60_000))
            .is_err());
        assert!(presence.is_empty());
    }

    #[test]
    fn far_past_stamp_is_rejected_and_the_store_stays_usable() {
        let presence = Presence::new(30_000);
        assert!(presence.apply_remote(&stamped_update("mallory", LoroValue::from(1i64), i64::MIN)).is_err());
        assert!(presence.apply_remote(&stamped_update("mallory", LoroValue::from(1i64), 0)).is_err());

        presence.apply_remote(&cursor_update("alice", 2)).unwrap();
        assert_eq!(presence.len(), 1);
        assert_eq!(presence.remove_outdated(), 0);
    }

    #[test]
    fn one_bad_entry_rejects_the_whole_update() {
        let presence = Presence::new(30_000);
        let update = postcard::to_allocvec(&vec![
            Stamped {
                key: "alice",
                value: Some(LoroValue::from(1i64)),
                timestamp: now(),
            },
            Stamped {
                key: "mallory",
                value: Some(LoroValue::from(2i64)),
                timestamp: i64::MAX,
            },
        ])
        .unwrap();
        assert!(presence.apply_remote(&update).is_err());
        assert!(presence.is_empty());
    }

    #[test]
    fn deeply_nested_values_are_rejected() {
        let presence = Presence::new(30_000);
        let mut value = LoroValue::Null;
        for _ in 0..(MAX_VALUE_DEPTH + 8) {
            value = LoroValue::List(vec![value].into());
        }
        assert!(presence.apply_remote(&stamped_update("deep", value, now())).is_err());
        assert!(presence.is_empty());
    }
}
