use thiserror::Error;

/// Access-log fields the pipeline reads by name on every line.
///
/// Each one gets a fixed slot in [`LogFields`] so the hot path never
/// hashes or allocates a key for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownField {
    RemoteAddr,
    HttpUserAgent,
    Request,
    Status,
    BodyBytesSent,
    RequestLength,
    RequestTime,
    UpstreamResponseTime,
    UpstreamConnectTime,
}

impl KnownField {
    pub const COUNT: usize = 9;

    pub const ALL: [KnownField; Self::COUNT] = [
        KnownField::RemoteAddr,
        KnownField::HttpUserAgent,
        KnownField::Request,
        KnownField::Status,
        KnownField::BodyBytesSent,
        KnownField::RequestLength,
        KnownField::RequestTime,
        KnownField::UpstreamResponseTime,
        KnownField::UpstreamConnectTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnownField::RemoteAddr => "remote_addr",
            KnownField::HttpUserAgent => "http_user_agent",
            KnownField::Request => "request",
            KnownField::Status => "status",
            KnownField::BodyBytesSent => "body_bytes_sent",
            KnownField::RequestLength => "request_length",
            KnownField::RequestTime => "request_time",
            KnownField::UpstreamResponseTime => "upstream_response_time",
            KnownField::UpstreamConnectTime => "upstream_connect_time",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line does not match the configured format")]
    NoMatch,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("JSON line is not an object")]
    NotAnObject,

    #[error("invalid format string: {0}")]
    InvalidFormat(String),
}

/// Field-name → value mapping produced by a parser for one line.
///
/// Well-known fields live in fixed slots; anything else (fields only used
/// as relabeling sources) goes to a small overflow list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFields {
    known: [Option<String>; KnownField::COUNT],
    extra: Vec<(String, String)>,
}

impl LogFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field by name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(field) = KnownField::from_name(name) {
            self.known[field.slot()] = Some(value);
            return;
        }
        match self.extra.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.extra.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match KnownField::from_name(name) {
            Some(field) => self.known(field),
            None => self
                .extra
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
        }
    }

    #[inline]
    pub fn known(&self, field: KnownField) -> Option<&str> {
        self.known[field.slot()].as_deref()
    }

    pub fn remove_known(&mut self, field: KnownField) -> Option<String> {
        self.known[field.slot()].take()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.known.iter().filter(|v| v.is_some()).count() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        KnownField::ALL
            .iter()
            .filter_map(|f| self.known(*f).map(|v| (f.as_str(), v)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for LogFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = LogFields::new();
        for (k, v) in iter {
            fields.insert(k.as_ref(), v);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_field_names_round_trip() {
        for field in KnownField::ALL {
            assert_eq!(KnownField::from_name(field.as_str()), Some(field));
        }
        assert_eq!(KnownField::from_name("http_referer"), None);
    }

    #[test]
    fn test_insert_known_and_extra() {
        let mut fields = LogFields::new();
        fields.insert("status", "200");
        fields.insert("http_referer", "-");

        assert_eq!(fields.known(KnownField::Status), Some("200"));
        assert_eq!(fields.get("status"), Some("200"));
        assert_eq!(fields.get("http_referer"), Some("-"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_insert_replaces_existing_value() {
        let mut fields = LogFields::new();
        fields.insert("upstream_addr", "10.0.0.1");
        fields.insert("upstream_addr", "10.0.0.2");
        fields.insert("status", "200");
        fields.insert("status", "502");

        assert_eq!(fields.get("upstream_addr"), Some("10.0.0.2"));
        assert_eq!(fields.get("status"), Some("502"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_remove_known() {
        let mut fields: LogFields = [("request_time", "0.1"), ("status", "200")]
            .into_iter()
            .collect();

        assert_eq!(fields.remove_known(KnownField::RequestTime), Some("0.1".to_string()));
        assert!(!fields.contains("request_time"));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_iter_yields_known_then_extra() {
        let fields: LogFields = [("zone", "eu"), ("status", "404")].into_iter().collect();
        let collected: Vec<_> = fields.iter().collect();
        assert_eq!(collected, vec![("status", "404"), ("zone", "eu")]);
    }

    #[test]
    fn test_empty_fields() {
        let fields = LogFields::new();
        assert!(fields.is_empty());
        assert_eq!(fields.get("status"), None);
    }
}
