//! Named records read out of key/value replies.
//!
//! Replies such as `TS.INFO`, `XINFO STREAM`, `FT.INFO` or `RG.PYSTATS` are
//! flat arrays alternating `name, value`. [`Record`] indexes such a reply by
//! name. Typed getters return the zero value when a field is missing or has
//! another shape.

use crate::resp::types::RespValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, RespValue)>,
}

impl Record {
    /// Read a record from a flat `k1, v1, k2, v2, …` array, or from an array
    /// of `[k, v]` pairs. Entries whose key is not a string are skipped.
    pub fn from_reply(reply: &RespValue) -> Self {
        let Some(items) = reply.as_array() else {
            return Self::default();
        };

        let pairs = !items.is_empty()
            && items
                .iter()
                .all(|item| matches!(item.as_array(), Some(pair) if pair.len() == 2));

        let mut entries = Vec::with_capacity(items.len() / 2 + 1);
        if pairs {
            for item in items {
                if let Some([key, value]) = item.as_array() {
                    if let Some(key) = key.text() {
                        entries.push((key, value.clone()));
                    }
                }
            }
        } else {
            for chunk in items.chunks_exact(2) {
                if let Some(key) = chunk[0].text() {
                    entries.push((key, chunk[1].clone()));
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&RespValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Integer field; text that parses as an integer is accepted too.
    pub fn int(&self, name: &str) -> i64 {
        self.get(name).and_then(RespValue::to_int).unwrap_or(0)
    }

    pub fn float(&self, name: &str) -> f64 {
        self.get(name).and_then(RespValue::to_f64).unwrap_or(0.0)
    }

    /// Text field; integers are rendered in base 10.
    pub fn text(&self, name: &str) -> String {
        self.get(name)
            .and_then(RespValue::to_text)
            .unwrap_or_default()
    }

    /// Boolean field: non-zero integers and `"true"`/`"1"` strings are true.
    pub fn bool(&self, name: &str) -> bool {
        match self.get(name) {
            Some(RespValue::Integer(i)) => *i != 0,
            Some(other) => matches!(
                other.text().as_deref().map(str::to_ascii_lowercase).as_deref(),
                Some("true" | "1" | "yes")
            ),
            None => false,
        }
    }

    /// Nested record field.
    pub fn record(&self, name: &str) -> Record {
        self.get(name).map(Record::from_reply).unwrap_or_default()
    }

    /// Array field; anything else reads as empty.
    pub fn list(&self, name: &str) -> &[RespValue] {
        self.get(name).and_then(RespValue::as_array).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RespValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn flat() -> RespValue {
        RespValue::Array(vec![
            "TotalAllocated".into(),
            RespValue::Integer(8_213_012),
            "PeakAllocated".into(),
            "9000".into(),
            "name".into(),
            RespValue::simple("reader"),
            "labels".into(),
            RespValue::Array(vec![RespValue::Array(vec!["a".into(), "1".into()])]),
        ])
    }

    #[test]
    fn flat_array_lookup() {
        let r = Record::from_reply(&flat());
        assert_eq!(r.len(), 4);
        assert_eq!(r.int("TotalAllocated"), 8_213_012);
        assert_eq!(r.int("PeakAllocated"), 9000);
        assert_eq!(r.text("name"), "reader");
        assert_eq!(r.text("TotalAllocated"), "8213012");
    }

    #[test]
    fn missing_fields_read_as_zero() {
        let r = Record::from_reply(&flat());
        assert_eq!(r.int("CurrAllocated"), 0);
        assert_eq!(r.float("nope"), 0.0);
        assert_eq!(r.text("nope"), "");
        assert!(!r.bool("nope"));
        assert!(r.list("nope").is_empty());
        assert!(r.record("nope").is_empty());
    }

    #[test]
    fn pair_array_lookup() {
        let reply = RespValue::Array(vec![
            RespValue::Array(vec!["retentionTime".into(), RespValue::Integer(0)]),
            RespValue::Array(vec!["chunkCount".into(), RespValue::Integer(1)]),
        ]);
        let r = Record::from_reply(&reply);
        assert_eq!(r.int("chunkCount"), 1);
        assert!(r.contains("retentionTime"));
    }

    #[test]
    fn nested_record() {
        let reply = RespValue::Array(vec![
            "RegistrationData".into(),
            RespValue::Array(vec!["mode".into(), "async".into(), "numTriggered".into(), RespValue::Integer(3)]),
        ]);
        let nested = Record::from_reply(&reply).record("RegistrationData");
        assert_eq!(nested.text("mode"), "async");
        assert_eq!(nested.int("numTriggered"), 3);
    }

    #[test]
    fn booleans() {
        let reply = RespValue::Array(vec![
            "IsDownloaded".into(),
            "yes".into(),
            "IsInstalled".into(),
            RespValue::Integer(0),
        ]);
        let r = Record::from_reply(&reply);
        assert!(r.bool("IsDownloaded"));
        assert!(!r.bool("IsInstalled"));
    }

    #[test]
    fn non_array_reply_is_empty() {
        assert!(Record::from_reply(&RespValue::Null).is_empty());
        assert!(Record::from_reply(&"OK".into()).is_empty());
    }

    #[test]
    fn odd_trailing_key_is_ignored() {
        let reply = RespValue::Array(vec!["a".into(), "1".into(), "b".into()]);
        let r = Record::from_reply(&reply);
        assert_eq!(r.len(), 1);
        assert_eq!(r.iter().next().map(|(k, _)| k), Some("a"));
    }
}
